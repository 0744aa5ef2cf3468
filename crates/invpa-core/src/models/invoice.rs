//! Invoice and counterparty data models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// An invoice read from one group of pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Kind of document (serialized as the integer code `1` or `2`).
    #[serde(rename = "type")]
    pub document_type: DocumentType,

    /// Invoice number as printed.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub number: String,

    /// Issue date.
    pub date: NaiveDate,

    /// Gross total.
    pub total_amount: Decimal,

    /// Tax portion of the total (zero when not shown).
    #[serde(default, deserialize_with = "null_as_zero")]
    pub tax_amount: Decimal,

    /// Short description of what was purchased.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub purpose: String,

    /// The other party on the invoice.
    pub counterparty: Counterparty,
}

impl Invoice {
    /// Check soft constraints, returning a list of issues worth reporting.
    ///
    /// Hard violations (negative tax) are rejected during extraction; this
    /// only flags things an operator may want to look at.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.number.trim().is_empty() {
            issues.push("Invoice number is missing".to_string());
        }

        if self.counterparty.name.trim().is_empty() {
            issues.push("Counterparty name is missing".to_string());
        }

        if self.tax_amount > self.total_amount && self.total_amount >= Decimal::ZERO {
            issues.push(format!(
                "Tax amount {} exceeds total amount {}",
                self.tax_amount, self.total_amount
            ));
        }

        issues
    }
}

/// Kind of payment document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DocumentType {
    /// Needs to be paid (invoice, bill).
    PaymentOrder,
    /// Proof that payment already happened (receipt, fiscal slip).
    Receipt,
}

impl DocumentType {
    /// Integer code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            DocumentType::PaymentOrder => 1,
            DocumentType::Receipt => 2,
        }
    }
}

impl TryFrom<u8> for DocumentType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(DocumentType::PaymentOrder),
            2 => Ok(DocumentType::Receipt),
            other => Err(format!("unknown document type {other}, expected 1 or 2")),
        }
    }
}

impl From<DocumentType> for u8 {
    fn from(value: DocumentType) -> Self {
        value.code()
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentType::PaymentOrder => write!(f, "payment order"),
            DocumentType::Receipt => write!(f, "receipt"),
        }
    }
}

/// A business entity that appears on invoices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    /// Registry id, assigned when the entity is first registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,

    /// Tax id.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub vat: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub country: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub address: String,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "blank_as_none")]
    pub swift: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "blank_as_none")]
    pub iban: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "blank_as_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "blank_as_none")]
    pub fax: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "blank_as_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "blank_as_none")]
    pub website: Option<String>,
}

impl Counterparty {
    /// Create a counterparty with the required fields set.
    pub fn new(
        name: impl Into<String>,
        vat: impl Into<String>,
        country: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vat: vat.into(),
            country: country.into(),
            address: address.into(),
            ..Default::default()
        }
    }

    /// Combine a registered entity with a newly extracted observation.
    ///
    /// Name, country, address and id always come from `self`. The tax id and
    /// every optional field are taken from `newer` only where `self` has
    /// nothing.
    pub fn merge(&self, newer: &Counterparty) -> Counterparty {
        let mut merged = self.clone();

        if merged.vat.trim().is_empty() {
            merged.vat = newer.vat.clone();
        }

        fill(&mut merged.swift, &newer.swift);
        fill(&mut merged.iban, &newer.iban);
        fill(&mut merged.phone, &newer.phone);
        fill(&mut merged.fax, &newer.fax);
        fill(&mut merged.email, &newer.email);
        fill(&mut merged.website, &newer.website);

        merged
    }

    /// Trim whitespace everywhere and turn blank optional fields into `None`.
    pub fn normalize(&mut self) {
        for field in [&mut self.name, &mut self.vat, &mut self.country, &mut self.address] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }

        for field in [
            &mut self.swift,
            &mut self.iban,
            &mut self.phone,
            &mut self.fax,
            &mut self.email,
            &mut self.website,
        ] {
            *field = field
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }
    }
}

fn fill(slot: &mut Option<String>, candidate: &Option<String>) {
    if is_blank(slot) {
        *slot = candidate.clone();
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Decimal>::deserialize(deserializer)?.unwrap_or_default())
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|v| !v.trim().is_empty()))
}

/// The operator's own company, excluded when picking the counterparty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyIdentity {
    pub name: String,
    pub vat: String,
    pub country: String,
    pub address: String,
}

impl CompanyIdentity {
    /// True when no identifying field is set.
    pub fn is_empty(&self) -> bool {
        [&self.name, &self.vat, &self.country, &self.address]
            .iter()
            .all(|v| v.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn acme() -> Counterparty {
        Counterparty {
            id: Some("c-1".to_string()),
            ..Counterparty::new("ACME Sp. z o.o.", "", "PL", "ul. Prosta 1, Warszawa")
        }
    }

    #[test]
    fn test_invoice_from_json() {
        let json = r#"{
            "type": 1,
            "number": "FV/2024/001",
            "date": "2024-03-15",
            "total_amount": 1230.50,
            "tax_amount": 230.50,
            "purpose": "office supplies",
            "counterparty": {
                "name": "ACME",
                "vat": "PL1234567890",
                "country": "PL",
                "address": "Warszawa",
                "iban": "",
                "email": null
            }
        }"#;

        let invoice: Invoice = serde_json::from_str(json).unwrap();
        assert_eq!(invoice.document_type, DocumentType::PaymentOrder);
        assert_eq!(invoice.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(invoice.total_amount, Decimal::new(123050, 2));
        assert_eq!(invoice.counterparty.iban, None);
        assert_eq!(invoice.counterparty.email, None);
        assert!(invoice.validate().is_empty());
    }

    #[test]
    fn test_document_type_codes() {
        assert_eq!(DocumentType::try_from(2), Ok(DocumentType::Receipt));
        assert!(DocumentType::try_from(3).is_err());
        assert_eq!(serde_json::to_string(&DocumentType::Receipt).unwrap(), "2");
        assert!(serde_json::from_str::<DocumentType>("0").is_err());
    }

    #[test]
    fn test_invoice_serializes_type_as_integer() {
        let invoice = Invoice {
            document_type: DocumentType::Receipt,
            number: "R-1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            total_amount: Decimal::new(100, 0),
            tax_amount: Decimal::ZERO,
            purpose: "fuel".to_string(),
            counterparty: Counterparty::new("Shell", "", "DE", "Berlin"),
        };

        let value = serde_json::to_value(&invoice).unwrap();
        assert_eq!(value["type"], 2);
        assert_eq!(value["date"], "2024-01-02");
        assert!(value["counterparty"].get("id").is_none());
    }

    #[test]
    fn test_merge_keeps_identity_fields() {
        let newer = Counterparty {
            iban: Some("PL61109010140000071219812874".to_string()),
            ..Counterparty::new("ACME Spółka", "PL1234567890", "Poland", "other address")
        };

        let merged = acme().merge(&newer);
        assert_eq!(merged.id.as_deref(), Some("c-1"));
        assert_eq!(merged.name, "ACME Sp. z o.o.");
        assert_eq!(merged.country, "PL");
        assert_eq!(merged.address, "ul. Prosta 1, Warszawa");
        assert_eq!(merged.vat, "PL1234567890");
        assert_eq!(merged.iban, newer.iban);
    }

    #[test]
    fn test_merge_does_not_overwrite_filled_fields() {
        let existing = Counterparty {
            email: Some("office@acme.pl".to_string()),
            vat: "PL111".to_string(),
            ..acme()
        };
        let newer = Counterparty {
            email: Some("sales@acme.pl".to_string()),
            phone: Some("+48 22 000 00 00".to_string()),
            ..Counterparty::new("ACME", "PL222", "PL", "")
        };

        let merged = existing.merge(&newer);
        assert_eq!(merged.email.as_deref(), Some("office@acme.pl"));
        assert_eq!(merged.vat, "PL111");
        assert_eq!(merged.phone.as_deref(), Some("+48 22 000 00 00"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let newer = Counterparty {
            swift: Some("BPKOPLPW".to_string()),
            website: Some("acme.pl".to_string()),
            ..Counterparty::new("ACME", "PL1", "PL", "x")
        };

        let once = acme().merge(&newer);
        let twice = once.merge(&newer);
        assert_eq!(once, twice);

        assert_eq!(newer.merge(&newer), newer);
        assert_eq!(acme().merge(&acme()), acme());
    }

    #[test]
    fn test_normalize_blanks() {
        let mut counterparty = Counterparty {
            phone: Some("   ".to_string()),
            fax: Some(" 123 ".to_string()),
            ..Counterparty::new("  ACME ", "", "PL", "")
        };
        counterparty.normalize();

        assert_eq!(counterparty.name, "ACME");
        assert_eq!(counterparty.phone, None);
        assert_eq!(counterparty.fax.as_deref(), Some("123"));
    }

    #[test]
    fn test_company_identity_is_empty() {
        assert!(CompanyIdentity::default().is_empty());
        let company = CompanyIdentity {
            name: "My Company".to_string(),
            ..Default::default()
        };
        assert!(!company.is_empty());
    }
}
