//! Address quality model
//!
//! Qualified and named addresses flow through the pipeline as immutable value
//! copies; a "quality update" produces a new value sharing the address.

use std::fmt;

use serde::Serialize;

/// Verification state of a network address.
///
/// `Invalid` and `Verified` are both terminal and of equal rank, which is why
/// this type offers [`Quality::rank`] instead of an `Ord` implementation: the
/// first terminal verdict for an address wins and a later one must compare as
/// stale, not greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Address neither in verification nor verified.
    Unverified,
    /// Address in verification.
    Verifying,
    /// Address could not be successfully verified.
    Invalid,
    /// Address successfully verified.
    Verified,
}

impl Quality {
    /// Monotone rank: Unverified(0) < Verifying(1) < {Invalid, Verified}(2).
    pub fn rank(self) -> u8 {
        match self {
            Quality::Unverified => 0,
            Quality::Verifying => 1,
            Quality::Invalid | Quality::Verified => 2,
        }
    }

    /// True for the two terminal verdicts.
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// True as long as an address hasn't reached a terminal verdict.
    pub fn is_pending(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quality::Unverified => "unverified",
            Quality::Verifying => "verifying",
            Quality::Invalid => "invalid",
            Quality::Verified => "verified",
        };
        f.write_str(s)
    }
}

/// A network address literal together with its verification quality and, for
/// invalid addresses, an optional diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualifiedAddress {
    /// A single IP (v4/v6) address in textual form.
    pub address: String,
    /// Verification state of the address.
    pub quality: Quality,
    /// Optional diagnostic when the quality is `Invalid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QualifiedAddress {
    /// A yet-unverified address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            quality: Quality::Unverified,
            error: None,
        }
    }

    /// Returns a new qualified address sharing this one's address literal.
    pub fn with_quality(&self, quality: Quality, error: Option<String>) -> Self {
        Self {
            address: self.address.clone(),
            quality,
            error,
        }
    }
}

/// An FQDN together with one associated (resolved) qualified address.
///
/// A named address with an empty address literal is a placeholder, announcing
/// that resolution for the name is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedAddress {
    /// The DNS name, trailing-dot terminated.
    pub fqdn: String,
    /// The associated address with its quality.
    #[serde(flatten)]
    pub address: QualifiedAddress,
}

impl NamedAddress {
    pub fn new(fqdn: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            address: QualifiedAddress::new(address),
        }
    }

    /// A placeholder carrying only the intent to look this name up.
    pub fn placeholder(fqdn: impl Into<String>) -> Self {
        Self::new(fqdn, "")
    }

    pub fn is_placeholder(&self) -> bool {
        self.address.address.is_empty()
    }

    /// Returns a new named address sharing this one's name and address.
    pub fn with_quality(&self, quality: Quality, error: Option<String>) -> Self {
        Self {
            fqdn: self.fqdn.clone(),
            address: self.address.with_quality(quality, error),
        }
    }
}

/// Tagged address record travelling through the prober: either a plain
/// qualified address or one still attached to its FQDN.
///
/// Quality updates preserve the tag, so a verdict for a named address keeps
/// its name and can be fanned out to all names sharing the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressRecord {
    Qualified(QualifiedAddress),
    Named(NamedAddress),
}

impl AddressRecord {
    pub fn addr(&self) -> &str {
        match self {
            AddressRecord::Qualified(qa) => &qa.address,
            AddressRecord::Named(na) => &na.address.address,
        }
    }

    pub fn quality(&self) -> Quality {
        match self {
            AddressRecord::Qualified(qa) => qa.quality,
            AddressRecord::Named(na) => na.address.quality,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AddressRecord::Qualified(qa) => qa.error.as_deref(),
            AddressRecord::Named(na) => na.address.error.as_deref(),
        }
    }

    /// Returns an updated record with the same tag.
    pub fn with_quality(&self, quality: Quality, error: Option<String>) -> Self {
        match self {
            AddressRecord::Qualified(qa) => {
                AddressRecord::Qualified(qa.with_quality(quality, error))
            }
            AddressRecord::Named(na) => AddressRecord::Named(na.with_quality(quality, error)),
        }
    }

    /// The named view of this record, if it carries a name.
    pub fn as_named(&self) -> Option<&NamedAddress> {
        match self {
            AddressRecord::Qualified(_) => None,
            AddressRecord::Named(na) => Some(na),
        }
    }
}

impl From<NamedAddress> for AddressRecord {
    fn from(na: NamedAddress) -> Self {
        AddressRecord::Named(na)
    }
}

impl From<QualifiedAddress> for AddressRecord {
    fn from(qa: QualifiedAddress) -> Self {
        AddressRecord::Qualified(qa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_ranks_are_monotone() {
        assert!(Quality::Unverified.rank() < Quality::Verifying.rank());
        assert!(Quality::Verifying.rank() < Quality::Verified.rank());
        assert!(Quality::Verifying.rank() < Quality::Invalid.rank());
        assert_eq!(Quality::Verified.rank(), Quality::Invalid.rank());
    }

    #[test]
    fn terminal_and_pending_split_the_states() {
        assert!(Quality::Unverified.is_pending());
        assert!(Quality::Verifying.is_pending());
        assert!(Quality::Verified.is_terminal());
        assert!(Quality::Invalid.is_terminal());
    }

    #[test]
    fn quality_renders_lowercase() {
        assert_eq!(Quality::Unverified.to_string(), "unverified");
        assert_eq!(Quality::Verifying.to_string(), "verifying");
        assert_eq!(Quality::Verified.to_string(), "verified");
        assert_eq!(Quality::Invalid.to_string(), "invalid");
    }

    #[test]
    fn with_quality_shares_the_address() {
        let qa = QualifiedAddress::new("10.0.0.2");
        let updated = qa.with_quality(Quality::Verified, None);
        assert_eq!(updated.address, "10.0.0.2");
        assert_eq!(updated.quality, Quality::Verified);
        // the source value is untouched
        assert_eq!(qa.quality, Quality::Unverified);
    }

    #[test]
    fn placeholder_has_empty_address() {
        let na = NamedAddress::placeholder("foo.net_a.");
        assert!(na.is_placeholder());
        assert!(!NamedAddress::new("foo.net_a.", "10.0.0.2").is_placeholder());
    }

    #[test]
    fn record_update_preserves_the_tag() {
        let named: AddressRecord = NamedAddress::new("foo.net_a.", "10.0.0.2").into();
        let updated = named.with_quality(Quality::Verifying, None);
        let na = updated.as_named().expect("named tag lost on update");
        assert_eq!(na.fqdn, "foo.net_a.");
        assert_eq!(na.address.quality, Quality::Verifying);

        let plain: AddressRecord = QualifiedAddress::new("10.0.0.2").into();
        assert!(plain
            .with_quality(Quality::Invalid, Some("oops".into()))
            .as_named()
            .is_none());
    }

    #[test]
    fn record_exposes_error_diagnostics() {
        let rec: AddressRecord = QualifiedAddress::new("10.0.0.99").into();
        let rec = rec.with_quality(Quality::Invalid, Some("no replies".into()));
        assert_eq!(rec.error(), Some("no replies"));
        assert_eq!(rec.quality(), Quality::Invalid);
        assert_eq!(rec.addr(), "10.0.0.99");
    }
}
