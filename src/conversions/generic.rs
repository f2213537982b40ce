//! User-supplied formula conversions.

use evalexpr::{ContextWithMutableVariables, HashMapContext, Node};

use crate::item::DataType;
use crate::{Error, Result, Value};

/// Evaluates a configured expression with the raw value bound as `value`.
///
/// The expression is compiled when the conversion is constructed, so a
/// malformed formula fails the definition load rather than the first packet.
#[derive(Debug, Clone)]
pub struct GenericConversion {
    code: String,
    node: Node,
    pub(crate) converted_type: Option<DataType>,
    pub(crate) converted_bit_size: Option<u32>,
}

impl GenericConversion {
    /// # Errors
    /// [`Error::Conversion`] when the formula does not parse.
    pub fn new(
        code: impl Into<String>,
        converted_type: Option<DataType>,
        converted_bit_size: Option<u32>,
    ) -> Result<Self> {
        let code = code.into();
        let node = evalexpr::build_operator_tree(&code)
            .map_err(|err| Error::Conversion(format!("invalid formula {code:?}: {err}")))?;
        Ok(Self {
            code,
            node,
            converted_type,
            converted_bit_size,
        })
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    pub(crate) fn call(&self, value: &Value) -> Result<Value> {
        let bound = match value {
            Value::Int(v) => evalexpr::Value::Int(*v),
            Value::Uint(v) => i64::try_from(*v)
                .map(evalexpr::Value::Int)
                .unwrap_or(evalexpr::Value::Float(*v as f64)),
            Value::Float(v) => evalexpr::Value::Float(*v),
            Value::String(s) => evalexpr::Value::String(s.clone()),
            other => {
                return Err(Error::Conversion(format!(
                    "cannot bind {} into a formula",
                    other.kind()
                )))
            }
        };
        let mut context = HashMapContext::new();
        context
            .set_value("value".to_string(), bound)
            .map_err(|err| Error::Conversion(err.to_string()))?;
        match self
            .node
            .eval_with_context(&context)
            .map_err(|err| Error::Conversion(format!("formula {:?}: {err}", self.code)))?
        {
            evalexpr::Value::Int(v) => Ok(Value::Int(v)),
            evalexpr::Value::Float(v) => Ok(Value::Float(v)),
            evalexpr::Value::String(s) => Ok(Value::String(s)),
            evalexpr::Value::Boolean(b) => Ok(Value::Uint(u64::from(b))),
            other => Err(Error::Conversion(format!(
                "formula {:?} produced unsupported result {other:?}",
                self.code
            ))),
        }
    }
}
