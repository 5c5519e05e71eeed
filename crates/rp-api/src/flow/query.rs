use url::form_urlencoded;

use crate::error::ApiError;

/// Query parameters with repeated keys preserved, so "exactly once" checks
/// can actually see duplicates.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Parse a raw query string; `None` yields no parameters.
    pub fn parse(raw: Option<&str>) -> Self {
        let pairs = form_urlencoded::parse(raw.unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
        Self { pairs }
    }

    /// Every value of `name`, in order.
    pub fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.pairs
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether `name` appears at all, even with an empty value.
    pub fn contains(&self, name: &str) -> bool {
        self.values(name).next().is_some()
    }

    /// The value of a parameter that must appear exactly once.
    pub fn single(&self, name: &str) -> Result<&str, ApiError> {
        self.optional(name)?
            .ok_or_else(|| ApiError::Protocol(format!("Missing {name} query parameter")))
    }

    /// The value of a parameter that may appear at most once.
    pub fn optional(&self, name: &str) -> Result<Option<&str>, ApiError> {
        let mut values = self.values(name);
        let first = values.next();
        let extra = values.count();
        if extra > 0 {
            return Err(ApiError::Protocol(format!(
                "{name} query parameter has {} values",
                extra + 1
            )));
        }
        Ok(first)
    }

    /// Every value of `name` joined for display; empty when absent.
    pub fn joined(&self, name: &str) -> String {
        self.values(name).collect::<Vec<_>>().join(", ")
    }
}
