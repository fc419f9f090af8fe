use crate::record::PackageRecord;

/// Record filter shared by [`Store::list`](crate::Store::list) and
/// [`Store::count`](crate::Store::count).
///
/// An exact id filter takes precedence; otherwise a non-blank free-text query
/// matches by substring. The default matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Query {
    #[default]
    All,
    /// Case-insensitive exact id match
    Id(String),
    /// Case-insensitive substring match against id, description and tags
    Text(String),
}

impl Query {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// A free-text query. Blank text matches everything.
    pub fn text(text: impl AsRef<str>) -> Self {
        match text.as_ref().trim() {
            "" => Self::All,
            text => Self::Text(text.to_string()),
        }
    }

    /// Build a query from the optional filters a caller may pass.
    pub fn from_filters(id: Option<&str>, text: Option<&str>) -> Self {
        match (id.map(str::trim).filter(|id| !id.is_empty()), text) {
            (Some(id), _) => Self::id(id),
            (None, Some(text)) => Self::text(text),
            (None, None) => Self::All,
        }
    }

    pub fn matches(&self, record: &PackageRecord) -> bool {
        match self {
            Self::All => true,
            Self::Id(id) => record.id.to_lowercase() == id.trim().to_lowercase(),
            Self::Text(text) => record.matches_text(text),
        }
    }
}
