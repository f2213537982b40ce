#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Illegal item layout or malformed conversion arguments, caught when the
    /// definition is constructed.
    #[error("item {item}: {message}")]
    ItemDefinition { item: String, message: String },

    #[error("unknown item: {0}")]
    UnknownItem(String),

    /// Out-of-range value written under the ERROR overflow policy.
    #[error("value of {value} invalid for {bit_size}-bit {data_type}")]
    Overflow {
        value: String,
        bit_size: u32,
        data_type: &'static str,
    },

    /// Per-call access failure: bad bounds, bad value shape, etc.
    #[error("{0}")]
    Access(String),

    /// Writing into a representation node whose shape is incompatible with
    /// the item's path, or using an accessor against the wrong representation.
    #[error("structural mismatch: {0}")]
    Structure(String),

    #[error("conversion failed: {0}")]
    Conversion(String),
}

impl Error {
    pub(crate) fn item(name: &str, message: impl Into<String>) -> Self {
        Error::ItemDefinition {
            item: name.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
