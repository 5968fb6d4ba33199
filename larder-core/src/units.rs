//! Measurement units for ingredient quantities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported measurement unit.
///
/// Units are stored by their short symbol; the long alias is accepted on
/// input so that forms can offer either spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "ml")]
    Millilitre,
    #[serde(rename = "L")]
    Litre,
    #[serde(rename = "tsp")]
    Teaspoon,
    #[serde(rename = "tbsp")]
    Tablespoon,
    #[serde(rename = "cup")]
    Cup,
    #[serde(rename = "oz")]
    Ounce,
    #[serde(rename = "lb")]
    Pound,
    #[serde(rename = "piece")]
    Piece,
}

impl Unit {
    /// Every supported unit, in display order.
    pub const ALL: [Unit; 10] = [
        Unit::Gram,
        Unit::Kilogram,
        Unit::Millilitre,
        Unit::Litre,
        Unit::Teaspoon,
        Unit::Tablespoon,
        Unit::Cup,
        Unit::Ounce,
        Unit::Pound,
        Unit::Piece,
    ];

    /// Short symbol, as persisted.
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Millilitre => "ml",
            Unit::Litre => "L",
            Unit::Teaspoon => "tsp",
            Unit::Tablespoon => "tbsp",
            Unit::Cup => "cup",
            Unit::Ounce => "oz",
            Unit::Pound => "lb",
            Unit::Piece => "piece",
        }
    }

    /// Long spelled-out alias.
    pub fn alias(self) -> &'static str {
        match self {
            Unit::Gram => "gram",
            Unit::Kilogram => "kilogram",
            Unit::Millilitre => "millilitre",
            Unit::Litre => "litre",
            Unit::Teaspoon => "teaspoon",
            Unit::Tablespoon => "tablespoon",
            Unit::Cup => "cup",
            Unit::Ounce => "ounce",
            Unit::Pound => "pound",
            Unit::Piece => "piece",
        }
    }

    /// Parse a symbol or alias. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> Option<Unit> {
        let trimmed = input.trim();
        Unit::ALL
            .into_iter()
            .find(|unit| unit.symbol() == trimmed || unit.alias() == trimmed)
    }

    /// Normalize free text to the persisted symbol, if it names a known unit.
    pub fn normalize(input: &str) -> Option<&'static str> {
        Unit::parse(input).map(Unit::symbol)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
