//! Change records.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use decor_core::Value;

use crate::splice::Splice;

/// Kind of a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeType {
    Add,
    Update,
    Delete,
    Reconfigure,
    SetPrototype,
    PreventExtensions,
    Splice,
    /// Application-defined type, emitted through
    /// [`Notifier::perform_change`](crate::Notifier::perform_change).
    Custom(&'static str),
}

impl ChangeType {
    /// Types an observer accepts when it gives no accept list.
    pub const DEFAULT_ACCEPT: [ChangeType; 6] = [
        ChangeType::Add,
        ChangeType::Update,
        ChangeType::Delete,
        ChangeType::Reconfigure,
        ChangeType::SetPrototype,
        ChangeType::PreventExtensions,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Reconfigure => "reconfigure",
            Self::SetPrototype => "setPrototype",
            Self::PreventExtensions => "preventExtensions",
            Self::Splice => "splice",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Property name or array index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyKey {
    Named(String),
    Index(usize),
}

impl PropertyKey {
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Named(_) => None,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        Self::Named(name.to_owned())
    }
}

impl From<String> for PropertyKey {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// Type-specific payload of a change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Add { name: PropertyKey },
    Update { name: PropertyKey, old_value: Value },
    Delete { name: PropertyKey, old_value: Value },
    Reconfigure { name: PropertyKey },
    SetPrototype,
    PreventExtensions,
    Splice(Splice),
    /// Composite record produced by a `perform_change` transaction.
    Synthetic {
        change_type: ChangeType,
        fields: BTreeMap<String, Value>,
    },
}

impl Change {
    /// Build a synthetic record of `change_type` carrying `fields`.
    pub fn synthetic<K, V>(change_type: ChangeType, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Synthetic {
            change_type,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn change_type(&self) -> ChangeType {
        match self {
            Self::Add { .. } => ChangeType::Add,
            Self::Update { .. } => ChangeType::Update,
            Self::Delete { .. } => ChangeType::Delete,
            Self::Reconfigure { .. } => ChangeType::Reconfigure,
            Self::SetPrototype => ChangeType::SetPrototype,
            Self::PreventExtensions => ChangeType::PreventExtensions,
            Self::Splice(_) => ChangeType::Splice,
            Self::Synthetic { change_type, .. } => *change_type,
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&PropertyKey> {
        match self {
            Self::Add { name }
            | Self::Update { name, .. }
            | Self::Delete { name, .. }
            | Self::Reconfigure { name } => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn old_value(&self) -> Option<&Value> {
        match self {
            Self::Update { old_value, .. } | Self::Delete { old_value, .. } => Some(old_value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_splice(&self) -> Option<&Splice> {
        match self {
            Self::Splice(splice) => Some(splice),
            _ => None,
        }
    }

    /// Force a synthetic record to carry `change_type`.
    pub(crate) fn retyped(self, change_type: ChangeType) -> Self {
        match self {
            Self::Synthetic { fields, .. } => Self::Synthetic {
                change_type,
                fields,
            },
            other => {
                debug_assert_eq!(
                    other.change_type(),
                    change_type,
                    "perform_change returned a record of another type"
                );
                other
            }
        }
    }
}

/// Identity of an observable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub(crate) u64);

/// A change record: which object changed, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub object: ObjectId,
    pub change: Change,
}

impl ChangeRecord {
    #[must_use]
    pub fn change_type(&self) -> ChangeType {
        self.change.change_type()
    }
}

/// Set of change types an observer wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptList(BTreeSet<ChangeType>);

impl Default for AcceptList {
    fn default() -> Self {
        Self(ChangeType::DEFAULT_ACCEPT.into_iter().collect())
    }
}

impl FromIterator<ChangeType> for AcceptList {
    fn from_iter<I: IntoIterator<Item = ChangeType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[ChangeType; N]> for AcceptList {
    fn from(types: [ChangeType; N]) -> Self {
        types.into_iter().collect()
    }
}

impl AcceptList {
    #[must_use]
    pub fn contains(&self, change_type: ChangeType) -> bool {
        self.0.contains(&change_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = ChangeType> + '_ {
        self.0.iter().copied()
    }
}
