use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of one source document in the blob store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobReference {
    pub account: String,
    pub container: String,
    pub name: String,
}

impl BlobReference {
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            name: name.into(),
        }
    }

    /// Stable key used by the per-document completion ledger
    pub fn ledger_key(&self) -> String {
        format!("{}/{}/{}", self.account, self.container, self.name)
    }
}

impl fmt::Display for BlobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}
