//! The four name-spaces whose names are resolved to integer ids.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A name-space with its own `(id, name)` table.
///
/// `Source` is the sensor (or manual observer) a reading came from; the
/// other three describe the physical context of the tracked subject.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumIter,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
  Source,
  Location,
  Position,
  Status,
}

impl Category {
  /// The backing table for this category.
  pub fn table(self) -> &'static str {
    match self {
      Self::Source => "sources",
      Self::Location => "locations",
      Self::Position => "positions",
      Self::Status => "statuses",
    }
  }

  /// Parse either the singular category name or its table name.
  pub fn parse(s: &str) -> crate::Result<Self> {
    use std::str::FromStr as _;
    use strum::IntoEnumIterator as _;

    Self::from_str(s)
      .ok()
      .or_else(|| Self::iter().find(|c| c.table() == s))
      .ok_or_else(|| crate::Error::UnknownCategory(s.to_owned()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_singular_and_table_names() {
    assert_eq!(Category::parse("position").unwrap(), Category::Position);
    assert_eq!(Category::parse("statuses").unwrap(), Category::Status);
    assert!(Category::parse("station").is_err());
  }

  #[test]
  fn display_is_lowercase() {
    assert_eq!(Category::Source.to_string(), "source");
    assert_eq!(Category::Status.as_ref(), "status");
  }
}
