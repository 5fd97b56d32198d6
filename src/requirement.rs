use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::Descriptor;
use crate::error::RequirementError;

/// One named descriptor.
pub(crate) struct Requirement<C> {
    pub(crate) name: String,
    pub(crate) descriptor: Arc<dyn Descriptor<C>>,
}

impl<C> Clone for Requirement<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            descriptor: Arc::clone(&self.descriptor),
        }
    }
}

/// The ordered descriptors a route needs.
///
/// Prerequisites are checked first and never reach the handler. Descriptors
/// are resolved in declaration order, and their values reach the handler
/// under their names.
///
/// # Examples
///
/// ```
/// use session_requirer::{Csrf, Field, RequirementSet};
///
/// let set = RequirementSet::<()>::builder()
///     .prerequisite("csrf", Csrf::new())
///     .require("name", Field::text())
///     .require("rating", Field::integer_in(1..=5))
///     .build()
///     .unwrap();
///
/// assert_eq!(set.names().collect::<Vec<_>>(), ["name", "rating"]);
/// ```
pub struct RequirementSet<C = ()> {
    prerequisites: Vec<Requirement<C>>,
    descriptors: Vec<Requirement<C>>,
}

impl<C> RequirementSet<C> {
    /// Starts building a requirement set.
    pub fn builder() -> RequirementSetBuilder<C> {
        RequirementSetBuilder {
            prerequisites: Vec::new(),
            descriptors: Vec::new(),
        }
    }

    /// Parameter names handed to the handler, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|r| r.name.as_str())
    }

    /// Prerequisite names, in declaration order.
    pub fn prerequisite_names(&self) -> impl Iterator<Item = &str> {
        self.prerequisites.iter().map(|r| r.name.as_str())
    }

    /// Number of descriptors handed to the handler.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if the handler receives no values.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub(crate) fn prerequisites(&self) -> &[Requirement<C>] {
        &self.prerequisites
    }

    pub(crate) fn descriptors(&self) -> &[Requirement<C>] {
        &self.descriptors
    }

    /// Returns the first name in this set that is also in `names`.
    pub(crate) fn conflict_with<'n>(&self, mut names: impl Iterator<Item = &'n str>) -> Option<String> {
        names
            .find(|name| {
                self.prerequisites
                    .iter()
                    .chain(&self.descriptors)
                    .any(|r| r.name == *name)
            })
            .map(str::to_string)
    }
}

impl<C> fmt::Debug for RequirementSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequirementSet")
            .field("prerequisites", &self.prerequisite_names().collect::<Vec<_>>())
            .field("descriptors", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`RequirementSet`].
///
/// Names are checked when [`build`](Self::build) is called.
pub struct RequirementSetBuilder<C> {
    prerequisites: Vec<Requirement<C>>,
    descriptors: Vec<Requirement<C>>,
}

impl<C> RequirementSetBuilder<C> {
    /// Adds a prerequisite. Its value is discarded.
    #[must_use]
    pub fn prerequisite(
        mut self,
        name: impl Into<String>,
        descriptor: impl Descriptor<C> + 'static,
    ) -> Self {
        self.prerequisites.push(Requirement {
            name: name.into(),
            descriptor: Arc::new(descriptor),
        });
        self
    }

    /// Adds a descriptor whose value is handed to the handler as `name`.
    #[must_use]
    pub fn require(
        mut self,
        name: impl Into<String>,
        descriptor: impl Descriptor<C> + 'static,
    ) -> Self {
        self.descriptors.push(Requirement {
            name: name.into(),
            descriptor: Arc::new(descriptor),
        });
        self
    }

    /// Finishes the set.
    ///
    /// # Errors
    ///
    /// - `RequirementError::EmptyName` if any name is empty
    /// - `RequirementError::DuplicateName` if two entries share a name
    pub fn build(self) -> Result<RequirementSet<C>, RequirementError> {
        check_names(self.prerequisites.iter().chain(&self.descriptors))?;
        Ok(RequirementSet {
            prerequisites: self.prerequisites,
            descriptors: self.descriptors,
        })
    }
}

pub(crate) fn check_names<'a, C: 'a>(
    requirements: impl Iterator<Item = &'a Requirement<C>>,
) -> Result<(), RequirementError> {
    let mut seen = HashSet::new();
    for requirement in requirements {
        if requirement.name.is_empty() {
            return Err(RequirementError::EmptyName);
        }
        if !seen.insert(requirement.name.as_str()) {
            return Err(RequirementError::DuplicateName(requirement.name.clone()));
        }
    }
    Ok(())
}
