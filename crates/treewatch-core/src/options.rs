#![forbid(unsafe_code)]

//! Observation options: which kinds of change a registration watches.
//!
//! [`ObserveOptions`] is the caller-facing record. Its `attributes` and
//! `character_data` fields are `Option<bool>` because their defaults depend
//! on the old-value and filter fields: asking for an attribute's old value
//! implies watching attributes, and so on. [`ObserveOptions::normalize`]
//! applies that defaulting and the deep validity rules, producing the
//! [`ResolvedOptions`] a registration actually stores.
//!
//! # Invariants
//!
//! 1. Normalization never mutates the input record; resolving twice yields
//!    the same result.
//! 2. A normalized record watches at least one change kind.
//! 3. Old-value and filter fields never contradict an explicit `false` on
//!    their base kind; contradictions fail normalization.
//!
//! The deep rules live here, in the subsystem: wrappers in front of it only
//! check that options are *present* and leave the rest to this step,
//! mirroring the platform contract they interpose on.

use serde::{Deserialize, Serialize};

use crate::observer::ObserveError;

/// Caller-facing observation options.
///
/// Build with the field-named builder methods:
///
/// ```
/// use treewatch_core::ObserveOptions;
///
/// let options = ObserveOptions::new().child_list(true).subtree(true);
/// assert!(options.normalize().is_ok());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserveOptions {
    /// Watch additions and removals of the target's children.
    pub child_list: bool,
    /// Watch attribute changes. `None` defaults to `true` when
    /// `attribute_old_value` or `attribute_filter` is set, else `false`.
    pub attributes: Option<bool>,
    /// Watch text payload changes. `None` defaults to `true` when
    /// `character_data_old_value` is set, else `false`.
    pub character_data: Option<bool>,
    /// Extend watching from the target to its whole subtree.
    pub subtree: bool,
    /// Attach the previous attribute value to attribute records.
    pub attribute_old_value: bool,
    /// Attach the previous text payload to character-data records.
    pub character_data_old_value: bool,
    /// Restrict attribute watching to these names. `None` watches all.
    pub attribute_filter: Option<Vec<String>>,
}

impl ObserveOptions {
    /// An empty record: nothing watched, nothing implied.
    ///
    /// Normalizing it fails with [`ObserveError::NoWatchKinds`]; set at
    /// least one kind first.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            child_list: false,
            attributes: None,
            character_data: None,
            subtree: false,
            attribute_old_value: false,
            character_data_old_value: false,
            attribute_filter: None,
        }
    }

    // ── Builder methods (named after their fields) ─────────────────────

    /// Watch child-list changes.
    #[must_use]
    pub fn child_list(mut self, on: bool) -> Self {
        self.child_list = on;
        self
    }

    /// Explicitly enable or disable attribute watching.
    #[must_use]
    pub fn attributes(mut self, on: bool) -> Self {
        self.attributes = Some(on);
        self
    }

    /// Explicitly enable or disable character-data watching.
    #[must_use]
    pub fn character_data(mut self, on: bool) -> Self {
        self.character_data = Some(on);
        self
    }

    /// Extend watching to the target's subtree.
    #[must_use]
    pub fn subtree(mut self, on: bool) -> Self {
        self.subtree = on;
        self
    }

    /// Ask for previous attribute values (implies `attributes` when unset).
    #[must_use]
    pub fn attribute_old_value(mut self, on: bool) -> Self {
        self.attribute_old_value = on;
        self
    }

    /// Ask for previous text payloads (implies `character_data` when unset).
    #[must_use]
    pub fn character_data_old_value(mut self, on: bool) -> Self {
        self.character_data_old_value = on;
        self
    }

    /// Watch only the named attributes (implies `attributes` when unset).
    #[must_use]
    pub fn attribute_filter<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Apply defaulting and deep validation.
    ///
    /// Rules, in order:
    ///
    /// 1. `attributes` defaults to `true` iff `attribute_old_value` is set
    ///    or `attribute_filter` is present.
    /// 2. `character_data` defaults to `true` iff
    ///    `character_data_old_value` is set.
    /// 3. At least one of `child_list` / `attributes` / `character_data`
    ///    must end up `true`.
    /// 4. `attribute_old_value` / `attribute_filter` with an explicit
    ///    `attributes = false` is rejected.
    /// 5. `character_data_old_value` with an explicit
    ///    `character_data = false` is rejected.
    pub fn normalize(&self) -> Result<ResolvedOptions, ObserveError> {
        let attributes = self
            .attributes
            .unwrap_or(self.attribute_old_value || self.attribute_filter.is_some());
        let character_data = self.character_data.unwrap_or(self.character_data_old_value);

        if !(self.child_list || attributes || character_data) {
            return Err(ObserveError::NoWatchKinds);
        }
        if self.attribute_old_value && self.attributes == Some(false) {
            return Err(ObserveError::OldValueWithoutAttributes);
        }
        if self.attribute_filter.is_some() && self.attributes == Some(false) {
            return Err(ObserveError::AttributeFilterWithoutAttributes);
        }
        if self.character_data_old_value && self.character_data == Some(false) {
            return Err(ObserveError::OldValueWithoutCharacterData);
        }

        Ok(ResolvedOptions {
            child_list: self.child_list,
            attributes,
            character_data,
            subtree: self.subtree,
            attribute_old_value: self.attribute_old_value,
            character_data_old_value: self.character_data_old_value,
            attribute_filter: self.attribute_filter.clone(),
        })
    }
}

/// Options after defaulting; what a registration stores.
///
/// All kind flags are plain booleans here, and invariant 2 of the module
/// holds: at least one of them is `true`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub child_list: bool,
    pub attributes: bool,
    pub character_data: bool,
    pub subtree: bool,
    pub attribute_old_value: bool,
    pub character_data_old_value: bool,
    pub attribute_filter: Option<Vec<String>>,
}

impl ResolvedOptions {
    /// Whether this registration watches changes to the named attribute.
    #[must_use]
    pub(crate) fn wants_attribute(&self, name: &str) -> bool {
        if !self.attributes {
            return false;
        }
        match &self.attribute_filter {
            Some(filter) => filter.iter().any(|f| f == name),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_options_are_rejected() {
        let err = ObserveOptions::new().normalize().unwrap_err();
        assert_eq!(err, ObserveError::NoWatchKinds);
    }

    #[test]
    fn child_list_alone_is_enough() {
        let resolved = ObserveOptions::new().child_list(true).normalize().unwrap();
        assert!(resolved.child_list);
        assert!(!resolved.attributes);
        assert!(!resolved.character_data);
        assert!(!resolved.subtree);
    }

    #[test]
    fn attribute_old_value_implies_attributes() {
        let resolved = ObserveOptions::new()
            .attribute_old_value(true)
            .normalize()
            .unwrap();
        assert!(resolved.attributes);
        assert!(resolved.attribute_old_value);
    }

    #[test]
    fn attribute_filter_implies_attributes() {
        let resolved = ObserveOptions::new()
            .attribute_filter(["class"])
            .normalize()
            .unwrap();
        assert!(resolved.attributes);
        assert_eq!(resolved.attribute_filter, Some(vec!["class".to_string()]));
    }

    #[test]
    fn character_data_old_value_implies_character_data() {
        let resolved = ObserveOptions::new()
            .character_data_old_value(true)
            .normalize()
            .unwrap();
        assert!(resolved.character_data);
    }

    #[test]
    fn old_value_with_explicit_attributes_false_is_rejected() {
        let err = ObserveOptions::new()
            .attributes(false)
            .child_list(true)
            .attribute_old_value(true)
            .normalize()
            .unwrap_err();
        assert_eq!(err, ObserveError::OldValueWithoutAttributes);
    }

    #[test]
    fn filter_with_explicit_attributes_false_is_rejected() {
        let err = ObserveOptions::new()
            .attributes(false)
            .child_list(true)
            .attribute_filter(["id"])
            .normalize()
            .unwrap_err();
        assert_eq!(err, ObserveError::AttributeFilterWithoutAttributes);
    }

    #[test]
    fn old_value_with_explicit_character_data_false_is_rejected() {
        let err = ObserveOptions::new()
            .character_data(false)
            .child_list(true)
            .character_data_old_value(true)
            .normalize()
            .unwrap_err();
        assert_eq!(err, ObserveError::OldValueWithoutCharacterData);
    }

    #[test]
    fn normalize_is_pure() {
        let options = ObserveOptions::new().child_list(true).attribute_old_value(true);
        let first = options.normalize().unwrap();
        let second = options.normalize().unwrap();
        assert_eq!(first, second);
        // The input record is untouched: `attributes` stays unset.
        assert_eq!(options.attributes, None);
    }

    #[test]
    fn wants_attribute_honors_filter() {
        let resolved = ObserveOptions::new()
            .attribute_filter(["class", "id"])
            .normalize()
            .unwrap();
        assert!(resolved.wants_attribute("class"));
        assert!(resolved.wants_attribute("id"));
        assert!(!resolved.wants_attribute("style"));

        let unfiltered = ObserveOptions::new().attributes(true).normalize().unwrap();
        assert!(unfiltered.wants_attribute("anything"));
    }
}
