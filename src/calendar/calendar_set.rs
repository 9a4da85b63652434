use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SetError {
    #[error("No calendar set is active")]
    NoActiveSet,
    #[error("More than one calendar set is active: {0:?}")]
    MultipleActiveSets(Vec<String>),
    #[error("Unknown calendar set: {0}")]
    UnknownSet(String),
    #[error("A calendar set named {0} already exists")]
    DuplicateName(String),
}

/// A named group of calendar ids. The set flagged `selected` is the active one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSet {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub selection: Vec<String>,
    #[serde(default)]
    pub selected: bool,
}

/// Sets may have been stored as an array or as an object keyed by set id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum StoredSets {
    List(Vec<CalendarSet>),
    Map(BTreeMap<String, CalendarSet>),
}

impl StoredSets {
    pub(crate) fn into_vec(self) -> Vec<CalendarSet> {
        match self {
            StoredSets::List(sets) => sets,
            StoredSets::Map(sets) => sets.into_values().collect(),
        }
    }
}

impl CalendarSet {
    pub fn new(name: impl Into<String>, selection: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            selection,
            selected: false,
        }
    }

    pub fn contains(&self, calendar_id: &str) -> bool {
        self.selection.iter().any(|id| id == calendar_id)
    }
}

/// Returns the single active set. Zero or several active sets are errors.
pub fn active_set(sets: &[CalendarSet]) -> Result<&CalendarSet, SetError> {
    let mut active = sets.iter().filter(|set| set.selected);

    match (active.next(), active.next()) {
        (None, _) => Err(SetError::NoActiveSet),
        (Some(set), None) => Ok(set),
        (Some(first), Some(second)) => {
            let mut names = vec![first.name.clone(), second.name.clone()];
            names.extend(active.map(|set| set.name.clone()));
            Err(SetError::MultipleActiveSets(names))
        }
    }
}

pub fn activate(sets: &mut [CalendarSet], name: &str) -> Result<(), SetError> {
    if !sets.iter().any(|set| set.name == name) {
        return Err(SetError::UnknownSet(name.to_string()));
    }

    for set in sets.iter_mut() {
        set.selected = set.name == name;
    }

    Ok(())
}
