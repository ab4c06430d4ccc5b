use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Kinds of generated acquisition documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Sow,
    Soo,
    Pws,
    Qasp,
    CostEstimate,
    MarketResearch,
    AcquisitionPlan,
    EvaluationPlan,
    FiscalLawReview,
    OpsecReview,
    IndustryRfi,
    SourcesSought,
    JustificationApproval,
    Codes,
    CompetitionAnalysis,
    ProcurementSourcing,
    Rrd,
    RequestForQuoteSimplified,
    RequestForQuote,
    RequestForProposal,
    ContractScaffold,
    CorAppointment,
    Analytics,
    OtherTransactionAgreement,
    FarUpdates,
}

impl DocumentType {
    /// Every document type.
    pub const ALL: [Self; 25] = [
        Self::Sow,
        Self::Soo,
        Self::Pws,
        Self::Qasp,
        Self::CostEstimate,
        Self::MarketResearch,
        Self::AcquisitionPlan,
        Self::EvaluationPlan,
        Self::FiscalLawReview,
        Self::OpsecReview,
        Self::IndustryRfi,
        Self::SourcesSought,
        Self::JustificationApproval,
        Self::Codes,
        Self::CompetitionAnalysis,
        Self::ProcurementSourcing,
        Self::Rrd,
        Self::RequestForQuoteSimplified,
        Self::RequestForQuote,
        Self::RequestForProposal,
        Self::ContractScaffold,
        Self::CorAppointment,
        Self::Analytics,
        Self::OtherTransactionAgreement,
        Self::FarUpdates,
    ];

    /// Stable kebab-case identifier used in cache keys and on the command line.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Sow => "sow",
            Self::Soo => "soo",
            Self::Pws => "pws",
            Self::Qasp => "qasp",
            Self::CostEstimate => "cost-estimate",
            Self::MarketResearch => "market-research",
            Self::AcquisitionPlan => "acquisition-plan",
            Self::EvaluationPlan => "evaluation-plan",
            Self::FiscalLawReview => "fiscal-law-review",
            Self::OpsecReview => "opsec-review",
            Self::IndustryRfi => "industry-rfi",
            Self::SourcesSought => "sources-sought",
            Self::JustificationApproval => "justification-approval",
            Self::Codes => "codes",
            Self::CompetitionAnalysis => "competition-analysis",
            Self::ProcurementSourcing => "procurement-sourcing",
            Self::Rrd => "rrd",
            Self::RequestForQuoteSimplified => "request-for-quote-simplified",
            Self::RequestForQuote => "request-for-quote",
            Self::RequestForProposal => "request-for-proposal",
            Self::ContractScaffold => "contract-scaffold",
            Self::CorAppointment => "cor-appointment",
            Self::Analytics => "analytics",
            Self::OtherTransactionAgreement => "other-transaction-agreement",
            Self::FarUpdates => "far-updates",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Sow => "Statement of Work",
            Self::Soo => "Statement of Objectives",
            Self::Pws => "Performance Work Statement",
            Self::Qasp => "Quality Assurance Surveillance Plan",
            Self::CostEstimate => "Independent Government Cost Estimate",
            Self::MarketResearch => "Market Research Report",
            Self::AcquisitionPlan => "Acquisition Plan",
            Self::EvaluationPlan => "Evaluation Plan",
            Self::FiscalLawReview => "Fiscal Law Review",
            Self::OpsecReview => "OPSEC Review",
            Self::IndustryRfi => "Industry RFI",
            Self::SourcesSought => "Sources Sought",
            Self::JustificationApproval => "Justification & Approval",
            Self::Codes => "NAICS & PSC",
            Self::CompetitionAnalysis => "Competition Analysis",
            Self::ProcurementSourcing => "Recommended Vendors",
            Self::Rrd => "Refined Requirement Document",
            Self::RequestForQuoteSimplified => "Request for Quote (Simplified)",
            Self::RequestForQuote => "Request for Quote",
            Self::RequestForProposal => "Request for Proposal",
            Self::ContractScaffold => "Contract",
            Self::CorAppointment => "COR Appointment",
            Self::Analytics => "Analytics",
            Self::OtherTransactionAgreement => "Other Transaction Agreement",
            Self::FarUpdates => "FAR Updates",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|doc| doc.slug() == wanted)
            .ok_or_else(|| Error::Config(format!("unknown document type '{s}'")))
    }
}

/// Partition of the key space: one bucket per document type plus one for
/// requirement analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Document(DocumentType),
    Analysis,
}

impl CacheCategory {
    /// Slug used as the key prefix: the document slug, or `analysis`.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Document(doc) => doc.slug(),
            Self::Analysis => "analysis",
        }
    }

    /// Whether this is a document category.
    #[must_use]
    pub const fn is_document(self) -> bool {
        matches!(self, Self::Document(_))
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for CacheCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("analysis") {
            return Ok(Self::Analysis);
        }
        s.parse().map(Self::Document)
    }
}

impl From<DocumentType> for CacheCategory {
    fn from(doc: DocumentType) -> Self {
        Self::Document(doc)
    }
}

/// A document produced by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    /// Display title.
    pub title: String,
    /// Kind of document.
    pub document_type: DocumentType,
    /// Document body.
    pub content: String,
    /// Generation time.
    pub created_at: DateTime<Utc>,
}

impl GeneratedDocument {
    /// Document with a title derived from its type.
    #[must_use]
    pub fn new(document_type: DocumentType, content: impl Into<String>) -> Self {
        Self {
            title: document_type.display_name().to_string(),
            document_type,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Replace the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// Output of requirement analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// Free-text analysis.
    pub response: String,
    /// Documents the analysis recommends generating.
    pub recommended_documents: Vec<DocumentType>,
}

/// Everything the cache knows how to store.
///
/// One serialization schema per kind; the tag travels inside the encrypted
/// payload so a decoded value always knows what it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedValue {
    Document(GeneratedDocument),
    Analysis(AnalysisResponse),
}

impl CachedValue {
    /// Category implied by the value itself.
    #[must_use]
    pub const fn category(&self) -> CacheCategory {
        match self {
            Self::Document(doc) => CacheCategory::Document(doc.document_type),
            Self::Analysis(_) => CacheCategory::Analysis,
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl From<GeneratedDocument> for CachedValue {
    fn from(doc: GeneratedDocument) -> Self {
        Self::Document(doc)
    }
}

impl From<AnalysisResponse> for CachedValue {
    fn from(analysis: AnalysisResponse) -> Self {
        Self::Analysis(analysis)
    }
}
