//! Protection records: collateral, guarantees and provisions.
//!
//! Each record is linked to the exposures it covers through one of three
//! mutually exclusive fields. The link is resolved once, at load, into
//! [`ProtectionLink`] using the precedence exposure list > facility >
//! counterparty; nothing downstream re-inspects the raw fields.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Cqs, Currency, Money};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Collateral types recognised for credit risk mitigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollateralType {
    Cash,
    Gold,
    GovernmentBond,
    CorporateBond,
    /// Equity in a main index.
    MainIndexEquity,
    /// Other listed equity.
    Equity,
    RealEstate,
    Receivables,
}

impl std::fmt::Display for CollateralType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollateralType::Cash => write!(f, "Cash"),
            CollateralType::Gold => write!(f, "Gold"),
            CollateralType::GovernmentBond => write!(f, "GovernmentBond"),
            CollateralType::CorporateBond => write!(f, "CorporateBond"),
            CollateralType::MainIndexEquity => write!(f, "MainIndexEquity"),
            CollateralType::Equity => write!(f, "Equity"),
            CollateralType::RealEstate => write!(f, "RealEstate"),
            CollateralType::Receivables => write!(f, "Receivables"),
        }
    }
}

/// Guarantor type, carried through for substitution downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuarantorType {
    Sovereign,
    Institution,
    Corporate,
    Other,
}

/// Processing order of protection kinds: provisions, then collateral, then
/// guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtectionKind {
    Provision,
    Collateral,
    Guarantee,
}

impl std::fmt::Display for ProtectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtectionKind::Provision => write!(f, "provision"),
            ProtectionKind::Collateral => write!(f, "collateral"),
            ProtectionKind::Guarantee => write!(f, "guarantee"),
        }
    }
}

// ---------------------------------------------------------------------------
// Linking
// ---------------------------------------------------------------------------

/// Raw linking fields as loaded. At most one should be populated; when
/// several are, the most granular wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_references: Option<Vec<String>>,
}

/// Resolved granularity of a protection record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtectionLink {
    /// Every reporting-view row of the counterparty.
    Counterparty(String),
    /// Every loan below the facility, plus its undrawn row if it is a root.
    Facility(String),
    /// An explicit list of exposure references.
    Exposures(Vec<String>),
}

impl LinkFields {
    pub fn counterparty(reference: &str) -> Self {
        Self {
            counterparty_reference: Some(reference.to_string()),
            ..Self::default()
        }
    }

    pub fn facility(reference: &str) -> Self {
        Self {
            facility_reference: Some(reference.to_string()),
            ..Self::default()
        }
    }

    pub fn exposures(references: &[&str]) -> Self {
        Self {
            exposure_references: Some(references.iter().map(|r| r.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Resolve by precedence; `None` when no field is populated. Blank
    /// strings and empty lists count as unpopulated.
    pub fn resolve(&self) -> Option<ProtectionLink> {
        if let Some(list) = self.exposure_references.as_ref().filter(|l| !l.is_empty()) {
            return Some(ProtectionLink::Exposures(list.clone()));
        }
        if let Some(f) = populated(&self.facility_reference) {
            return Some(ProtectionLink::Facility(f.to_string()));
        }
        populated(&self.counterparty_reference).map(|c| ProtectionLink::Counterparty(c.to_string()))
    }

    /// Number of populated fields; more than one means precedence applied.
    pub fn populated_count(&self) -> usize {
        let mut n = 0;
        if self
            .exposure_references
            .as_ref()
            .is_some_and(|l| !l.is_empty())
        {
            n += 1;
        }
        if populated(&self.facility_reference).is_some() {
            n += 1;
        }
        if populated(&self.counterparty_reference).is_some() {
            n += 1;
        }
        n
    }
}

/// Trimmed field value, or `None` when absent or blank.
fn populated(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collateral {
    pub reference: String,
    pub collateral_type: CollateralType,
    pub market_value: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_date: Option<NaiveDate>,
    /// CQS of the issuer, for debt securities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_cqs: Option<Cqs>,
    #[serde(flatten)]
    pub link: LinkFields,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guarantee {
    pub reference: String,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maturity_date: Option<NaiveDate>,
    pub guarantor_reference: String,
    pub guarantor_type: GuarantorType,
    /// Falls back to the guarantor counterparty's effective CQS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guarantor_cqs: Option<Cqs>,
    #[serde(flatten)]
    pub link: LinkFields,
}

/// A specific provision (credit risk adjustment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provision {
    pub reference: String,
    pub amount: Money,
    #[serde(flatten)]
    pub link: LinkFields,
}

/// All protection records for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionInput {
    pub collateral: Vec<Collateral>,
    pub guarantees: Vec<Guarantee>,
    pub provisions: Vec<Provision>,
}

// ---------------------------------------------------------------------------
// Normalised record
// ---------------------------------------------------------------------------

/// Kind-specific attributes of a normalised record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionDetail {
    Collateral {
        collateral_type: CollateralType,
        issuer_cqs: Option<Cqs>,
    },
    Guarantee {
        guarantor_reference: String,
        guarantor_type: GuarantorType,
        guarantor_cqs: Option<Cqs>,
    },
    Provision,
}

/// A protection record with its link resolved, in the form the engine
/// allocates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionRecord {
    pub kind: ProtectionKind,
    pub reference: String,
    pub raw_value: Money,
    pub currency: Option<Currency>,
    pub maturity_date: Option<NaiveDate>,
    pub link: ProtectionLink,
    pub detail: ProtectionDetail,
}

impl ProtectionRecord {
    /// Deterministic processing key.
    pub fn order_key(&self) -> (ProtectionKind, &str) {
        (self.kind, self.reference.as_str())
    }
}

/// Loaded record not yet linked: (kind, reference, value, link fields).
pub(crate) struct RawProtection<'a> {
    pub kind: ProtectionKind,
    pub reference: &'a str,
    pub value: Money,
    pub link: &'a LinkFields,
    pub currency: Option<&'a Currency>,
    pub maturity_date: Option<NaiveDate>,
    pub detail: ProtectionDetail,
}

impl ProtectionInput {
    /// Every record in input order, with its kind-specific detail.
    pub(crate) fn raw_records(&self) -> Vec<RawProtection<'_>> {
        let provisions = self.provisions.iter().map(|p| RawProtection {
            kind: ProtectionKind::Provision,
            reference: &p.reference,
            value: p.amount,
            link: &p.link,
            currency: None,
            maturity_date: None,
            detail: ProtectionDetail::Provision,
        });
        let collateral = self.collateral.iter().map(|c| RawProtection {
            kind: ProtectionKind::Collateral,
            reference: &c.reference,
            value: c.market_value,
            link: &c.link,
            currency: c.currency.as_ref(),
            maturity_date: c.maturity_date,
            detail: ProtectionDetail::Collateral {
                collateral_type: c.collateral_type,
                issuer_cqs: c.issuer_cqs,
            },
        });
        let guarantees = self.guarantees.iter().map(|g| RawProtection {
            kind: ProtectionKind::Guarantee,
            reference: &g.reference,
            value: g.amount,
            link: &g.link,
            currency: g.currency.as_ref(),
            maturity_date: g.maturity_date,
            detail: ProtectionDetail::Guarantee {
                guarantor_reference: g.guarantor_reference.clone(),
                guarantor_type: g.guarantor_type,
                guarantor_cqs: g.guarantor_cqs,
            },
        });
        provisions.chain(collateral).chain(guarantees).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.collateral.is_empty() && self.guarantees.is_empty() && self.provisions.is_empty()
    }
}

impl RawProtection<'_> {
    pub fn into_record(self, link: ProtectionLink) -> ProtectionRecord {
        ProtectionRecord {
            kind: self.kind,
            reference: self.reference.to_string(),
            raw_value: self.value.max(Decimal::ZERO),
            currency: self.currency.cloned(),
            maturity_date: self.maturity_date,
            link,
            detail: self.detail,
        }
    }
}
