//! Option values and their dispatch onto the engine's setter entry points.
//!
//! The engine multiplexes one conceptual "set option" operation over six entry
//! points, one per payload shape. The shape is a sum type here, so the entry
//! point is selected by pattern match and malformed shapes cannot be
//! constructed.

/// A configuration option payload.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Text(String),
    Int(i32),
    Float(f32),
    Bool(bool),
    /// An (x, y) integer pair, e.g. an image size.
    Point(i32, i32),
    /// An (r, g, b) float triple.
    Color(f32, f32, f32),
}

/// Payload shape, naming the engine entry point the value dispatches to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKind {
    Text,
    Int,
    Float,
    Bool,
    Point,
    Color,
}

impl OptionValue {
    /// Shape of this value; decides which setter entry point is invoked.
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::Text(_) => OptionKind::Text,
            Self::Int(_) => OptionKind::Int,
            Self::Float(_) => OptionKind::Float,
            Self::Bool(_) => OptionKind::Bool,
            Self::Point(..) => OptionKind::Point,
            Self::Color(..) => OptionKind::Color,
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for OptionValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value as f32)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<(i32, i32)> for OptionValue {
    fn from((x, y): (i32, i32)) -> Self {
        Self::Point(x, y)
    }
}

impl From<(f32, f32, f32)> for OptionValue {
    fn from((r, g, b): (f32, f32, f32)) -> Self {
        Self::Color(r, g, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_selects_entry_point() {
        assert_eq!(OptionValue::from("svg").kind(), OptionKind::Text);
        assert_eq!(OptionValue::from(640).kind(), OptionKind::Int);
        assert_eq!(OptionValue::from(0.5f32).kind(), OptionKind::Float);
        assert_eq!(OptionValue::from(true).kind(), OptionKind::Bool);
        assert_eq!(OptionValue::from((640, 480)).kind(), OptionKind::Point);
        assert_eq!(
            OptionValue::from((1.0f32, 1.0f32, 1.0f32)).kind(),
            OptionKind::Color
        );
    }

    #[test]
    fn bool_is_not_an_int() {
        // The engine's bool setter takes 0/1, but the shape stays Bool so the
        // dispatch never confuses it with Int.
        assert_ne!(OptionValue::from(true), OptionValue::Int(1));
    }
}
