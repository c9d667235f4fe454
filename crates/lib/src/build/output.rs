//! Build script output classification.
//!
//! A script loader hands back an untyped [`ScriptValue`]. [`classify`] maps it
//! onto exactly one [`BuildOutput`] variant or rejects it:
//!
//! 1. a mapping is a [`BuildDescription`] for the description bundler
//! 2. text or bytes are raw content for the primary payload
//! 3. a stream is piped into the primary payload
//! 4. anything else is an [`BuildError::OutputClassification`]

use std::fmt;
use std::io::Read;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::types::BuildError;

/// Value returned by a build script, before classification.
pub enum ScriptValue {
  Map(Map<String, Value>),
  List(Vec<Value>),
  Text(String),
  Bytes(Vec<u8>),
  Stream(Box<dyn Read + Send>),
  /// Any other value, carrying its type name.
  Other(String),
}

impl ScriptValue {
  pub fn type_name(&self) -> &str {
    match self {
      ScriptValue::Map(_) => "table",
      ScriptValue::List(_) => "array table",
      ScriptValue::Text(_) => "string",
      ScriptValue::Bytes(_) => "binary string",
      ScriptValue::Stream(_) => "stream",
      ScriptValue::Other(name) => name,
    }
  }
}

impl fmt::Debug for ScriptValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ScriptValue({})", self.type_name())
  }
}

/// A structured build description, interpreted by a description bundler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildDescription(pub Map<String, Value>);

impl BuildDescription {
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  /// Deserialize the description into a bundler-specific shape.
  pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(self.0.clone()))
  }
}

/// A classified build script result.
pub enum BuildOutput {
  StructuredDescription(BuildDescription),
  RawContent(Vec<u8>),
  Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for BuildOutput {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildOutput::StructuredDescription(desc) => f.debug_tuple("StructuredDescription").field(desc).finish(),
      BuildOutput::RawContent(bytes) => write!(f, "RawContent({} bytes)", bytes.len()),
      BuildOutput::Stream(_) => f.write_str("Stream"),
    }
  }
}

/// Classify a script value. The first matching shape wins.
pub fn classify(value: ScriptValue) -> Result<BuildOutput, BuildError> {
  match value {
    ScriptValue::Map(map) => Ok(BuildOutput::StructuredDescription(BuildDescription(map))),
    ScriptValue::Text(text) => Ok(BuildOutput::RawContent(text.into_bytes())),
    ScriptValue::Bytes(bytes) => Ok(BuildOutput::RawContent(bytes)),
    ScriptValue::Stream(stream) => Ok(BuildOutput::Stream(stream)),
    other @ (ScriptValue::List(_) | ScriptValue::Other(_)) => Err(BuildError::OutputClassification {
      found: other.type_name().to_string(),
    }),
  }
}
