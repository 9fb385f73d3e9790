//! Key layout in the shared store.

/// Builds every key Scout reads or writes, under one namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("scout:")
    }
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn model(&self, model_id: &str) -> String {
        format!("{}model:{model_id}", self.prefix)
    }

    pub fn model_version(&self, model_id: &str) -> String {
        format!("{}model_version:{model_id}", self.prefix)
    }

    pub fn lock(&self, model_id: &str) -> String {
        format!("{}lock:model:{model_id}", self.prefix)
    }

    pub fn context(&self, request_id: &str) -> String {
        format!("{}context:{request_id}", self.prefix)
    }

    /// Prefix shared by all model blob keys.
    pub fn model_prefix(&self) -> String {
        format!("{}model:", self.prefix)
    }

    pub fn context_prefix(&self) -> String {
        format!("{}context:", self.prefix)
    }

    /// Recover the model id from a model blob key.
    pub fn model_id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())?.strip_prefix("model:")
    }
}
