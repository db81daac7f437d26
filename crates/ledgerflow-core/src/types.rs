use serde::{Deserialize, Serialize};

/// Opaque reference to a document produced by a collaborator
/// (a journal entry, a payment, a reconciliation result).
///
/// The engine never looks inside; it only stores the reference on the
/// step that produced it and hands it back to external actors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef(pub String);

/// Opaque reference to a document template, consumed only by the
/// document-creation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateRef(pub String);

/// Opaque reference to the originating record of a workflow, typically
/// a bank movement the operation was started from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginRef(pub String);

/// A counterparty (partner) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counterparty(pub String);

/// Key of an operating context (tenant/legal entity) a workflow
/// instance runs under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey(pub String);

/// ISO currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyCode(pub String);

/// Data carried by a bank movement used to seed a new workflow
/// instance: the movement reference plus whatever the movement already
/// knows about the counterparty, currency and amount.
///
/// Explicitly supplied start-request fields always win over these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginInfo {
    /// The movement reference, stored on the instance
    pub reference: OriginRef,

    /// Counterparty the movement was matched to, if any
    pub counterparty: Option<Counterparty>,

    /// Currency of the movement, if known
    pub currency: Option<CurrencyCode>,

    /// Amount of the movement, if known
    pub amount: Option<f64>,
}

/// The resolved operating environment for a context key, produced by
/// the context-resolver collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingContext {
    /// The key this environment was resolved from
    pub key: ContextKey,

    /// Human-readable name of the context (e.g. a legal entity name)
    pub name: String,

    /// Default currency of the context
    pub currency: CurrencyCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newtype_serialization() {
        let document = DocumentRef("DOC-001".to_string());
        let serialized = serde_json::to_string(&document).unwrap();
        assert_eq!(serialized, "\"DOC-001\"");

        let deserialized: DocumentRef = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, document);
    }

    #[test]
    fn test_origin_info_defaults_roundtrip() {
        let origin = OriginInfo {
            reference: OriginRef("ST-42".to_string()),
            counterparty: Some(Counterparty("partner-1".to_string())),
            currency: None,
            amount: Some(1000.0),
        };

        let serialized = serde_json::to_string(&origin).unwrap();
        let deserialized: OriginInfo = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, origin);
    }
}
