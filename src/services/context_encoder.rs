//! Context encoding.
//!
//! Turns a raw named-feature context into the numeric vector the decision
//! policy consumes, ordered by the model's feature order.

use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ContextSchema, RawContext};

/// A context value the encoder knows how to represent.
enum Scalar<'a> {
    Number(f64),
    Flag(bool),
    Category(&'a str),
}

fn classify<'a>(feature: &str, value: &'a Value) -> DomainResult<Scalar<'a>> {
    let unsupported = |kind: &str| DomainError::EncodingError {
        feature: feature.to_string(),
        kind: kind.to_string(),
    };

    match value {
        Value::Bool(flag) => Ok(Scalar::Flag(*flag)),
        Value::Number(number) => number.as_f64().map(Scalar::Number).ok_or_else(|| unsupported("number")),
        Value::String(text) => Ok(Scalar::Category(text)),
        Value::Null => Err(unsupported("null")),
        Value::Array(_) => Err(unsupported("array")),
        Value::Object(_) => Err(unsupported("object")),
    }
}

pub struct ContextEncoder;

impl ContextEncoder {
    /// Encode `raw` against `schema`, learning what is new.
    ///
    /// An unseeded schema takes all names of the first non-empty context,
    /// sorted. Names outside a fixed order are ignored and missing names
    /// encode as 0.0. Unseen categorical values get the next ordinal. On
    /// error the schema is left untouched.
    pub fn encode(schema: &mut ContextSchema, raw: &RawContext) -> DomainResult<Vec<f64>> {
        let seeding = !schema.is_seeded() && !raw.is_empty();
        let order: Vec<String> = if seeding {
            raw.keys().cloned().collect()
        } else {
            schema.feature_order.clone()
        };

        // Validate everything before touching the schema.
        let scalars = order
            .iter()
            .map(|feature| raw.get(feature).map(|value| classify(feature, value)).transpose())
            .collect::<DomainResult<Vec<_>>>()?;

        if seeding {
            schema.feature_order = order;
            tracing::debug!(features = ?schema.feature_order, "seeded feature order");
        }

        let mut encoded = Vec::with_capacity(scalars.len());
        for (feature, scalar) in schema.feature_order.iter().zip(scalars) {
            let value = match scalar {
                None => 0.0,
                Some(Scalar::Flag(flag)) => f64::from(u8::from(flag)),
                Some(Scalar::Number(number)) => number,
                Some(Scalar::Category(text)) => {
                    let encoder = schema.categorical_encoders.entry(feature.clone()).or_default();
                    let next = u32::try_from(encoder.len()).unwrap_or(u32::MAX);
                    f64::from(*encoder.entry(text.to_string()).or_insert(next))
                }
            };
            encoded.push(value);
        }
        Ok(encoded)
    }
}
