//! Bib-1 diagnostics and their SRU equivalents.
//!
//! Diagnostics are values, not errors: they travel inside otherwise valid
//! responses. A diagnostic replacing a whole response is *non-surrogate*; one
//! standing in for a single record is *surrogate*.

use std::fmt;

use bincode::{Decode, Encode};

/// Bib-1 diagnostic codes synthesised by the engine or the bundled backend.
pub mod bib1 {
    /// Permanent system error.
    pub const PERMANENT_SYSTEM_ERROR: u32 = 1;
    /// Temporary system error.
    pub const TEMPORARY_SYSTEM_ERROR: u32 = 2;
    /// Unsupported search.
    pub const UNSUPPORTED_SEARCH: u32 = 3;
    /// Present request out of range.
    pub const PRESENT_OUT_OF_RANGE: u32 = 13;
    /// System error in presenting records.
    pub const PRESENT_SYSTEM_ERROR: u32 = 14;
    /// Record exceeds preferred message size.
    pub const RECORD_EXCEEDS_PREFERRED_SIZE: u32 = 16;
    /// Record exceeds exceptional (maximum) record size.
    pub const RECORD_EXCEEDS_MAXIMUM_SIZE: u32 = 17;
    /// Result set exists and the replace indicator is off.
    pub const RESULT_SET_EXISTS: u32 = 21;
    /// Specified result set does not exist.
    pub const RESULT_SET_NOT_FOUND: u32 = 30;
    /// Query type not supported.
    pub const QUERY_TYPE_UNSUPPORTED: u32 = 107;
    /// Malformed query.
    pub const MALFORMED_QUERY: u32 = 108;
    /// Database unavailable.
    pub const DATABASE_UNAVAILABLE: u32 = 109;
    /// Database does not exist.
    pub const DATABASE_NOT_FOUND: u32 = 235;
    /// Record syntax not supported.
    pub const RECORD_SYNTAX_UNSUPPORTED: u32 = 239;
}

/// SRU diagnostic codes used by the HTTP variant.
pub mod sru {
    /// General system error.
    pub const GENERAL_SYSTEM_ERROR: u32 = 1;
    /// System temporarily unavailable.
    pub const SYSTEM_TEMPORARILY_UNAVAILABLE: u32 = 2;
    /// Unsupported operation.
    pub const UNSUPPORTED_OPERATION: u32 = 4;
    /// Unsupported parameter value.
    pub const UNSUPPORTED_PARAMETER_VALUE: u32 = 6;
    /// Mandatory parameter not supplied.
    pub const MANDATORY_PARAMETER_MISSING: u32 = 7;
    /// Query syntax error.
    pub const QUERY_SYNTAX_ERROR: u32 = 10;
    /// Query feature unsupported.
    pub const QUERY_FEATURE_UNSUPPORTED: u32 = 48;
    /// Result set does not exist.
    pub const RESULT_SET_NOT_FOUND: u32 = 51;
    /// First record position out of range.
    pub const FIRST_RECORD_OUT_OF_RANGE: u32 = 61;
    /// System error in presenting records.
    pub const PRESENT_SYSTEM_ERROR: u32 = 63;
    /// Unknown schema for retrieval.
    pub const UNKNOWN_SCHEMA: u32 = 66;
    /// Record too large to send.
    pub const RECORD_TOO_LARGE: u32 = 70;
    /// Database does not exist.
    pub const DATABASE_NOT_FOUND: u32 = 235;
}

/// A bib-1 diagnostic with optional additional information.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub struct Diagnostic {
    /// Bib-1 condition code.
    pub code: u32,
    /// Free-form detail, usually the offending term or database name.
    pub addinfo: Option<String>,
}

impl Diagnostic {
    /// Build a diagnostic without additional information.
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self {
            code,
            addinfo: None,
        }
    }

    /// Build a diagnostic carrying additional information.
    #[must_use]
    pub fn with_addinfo(code: u32, addinfo: impl Into<String>) -> Self {
        Self {
            code,
            addinfo: Some(addinfo.into()),
        }
    }

    /// Diagnostic for a service the backend does not implement.
    ///
    /// Search-like services report "unsupported search"; anything else is a
    /// permanent system error naming the service.
    #[must_use]
    pub fn service_not_supported(service: &str) -> Self {
        match service {
            "search" | "scan" => Self::with_addinfo(bib1::UNSUPPORTED_SEARCH, service),
            _ => Self::with_addinfo(
                bib1::PERMANENT_SYSTEM_ERROR,
                format!("{service} not supported"),
            ),
        }
    }

    /// Human readable text for the condition code.
    #[must_use]
    pub const fn message(&self) -> &'static str { bib1_message(self.code) }

    /// The SRU code a client of the HTTP variant should see.
    #[must_use]
    pub const fn sru_code(&self) -> u32 { bib1_to_sru(self.code) }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bib-1 {} ({})", self.code, self.message())?;
        if let Some(addinfo) = &self.addinfo {
            write!(f, ": {addinfo}")?;
        }
        Ok(())
    }
}

/// Describe a bib-1 condition code.
#[must_use]
pub const fn bib1_message(code: u32) -> &'static str {
    match code {
        bib1::PERMANENT_SYSTEM_ERROR => "permanent system error",
        bib1::TEMPORARY_SYSTEM_ERROR => "temporary system error",
        bib1::UNSUPPORTED_SEARCH => "unsupported search",
        bib1::PRESENT_OUT_OF_RANGE => "present request out of range",
        bib1::PRESENT_SYSTEM_ERROR => "system error in presenting records",
        bib1::RECORD_EXCEEDS_PREFERRED_SIZE => "record exceeds preferred message size",
        bib1::RECORD_EXCEEDS_MAXIMUM_SIZE => "record exceeds maximum record size",
        bib1::RESULT_SET_EXISTS => "result set exists and replace indicator off",
        bib1::RESULT_SET_NOT_FOUND => "specified result set does not exist",
        bib1::QUERY_TYPE_UNSUPPORTED => "query type not supported",
        bib1::MALFORMED_QUERY => "malformed query",
        bib1::DATABASE_UNAVAILABLE => "database unavailable",
        bib1::DATABASE_NOT_FOUND => "database does not exist",
        bib1::RECORD_SYNTAX_UNSUPPORTED => "record syntax not supported",
        _ => "unspecified error",
    }
}

/// Map a bib-1 code onto the closest SRU diagnostic.
#[must_use]
pub const fn bib1_to_sru(code: u32) -> u32 {
    match code {
        bib1::TEMPORARY_SYSTEM_ERROR | bib1::DATABASE_UNAVAILABLE => {
            sru::SYSTEM_TEMPORARILY_UNAVAILABLE
        }
        bib1::UNSUPPORTED_SEARCH | bib1::QUERY_TYPE_UNSUPPORTED => sru::QUERY_FEATURE_UNSUPPORTED,
        bib1::PRESENT_OUT_OF_RANGE => sru::FIRST_RECORD_OUT_OF_RANGE,
        bib1::PRESENT_SYSTEM_ERROR => sru::PRESENT_SYSTEM_ERROR,
        bib1::RECORD_EXCEEDS_PREFERRED_SIZE | bib1::RECORD_EXCEEDS_MAXIMUM_SIZE => {
            sru::RECORD_TOO_LARGE
        }
        bib1::RESULT_SET_NOT_FOUND => sru::RESULT_SET_NOT_FOUND,
        bib1::MALFORMED_QUERY => sru::QUERY_SYNTAX_ERROR,
        bib1::DATABASE_NOT_FOUND => sru::DATABASE_NOT_FOUND,
        bib1::RECORD_SYNTAX_UNSUPPORTED => sru::UNKNOWN_SCHEMA,
        _ => sru::GENERAL_SYSTEM_ERROR,
    }
}

/// Describe an SRU diagnostic code.
#[must_use]
pub const fn sru_message(code: u32) -> &'static str {
    match code {
        sru::GENERAL_SYSTEM_ERROR => "General system error",
        sru::SYSTEM_TEMPORARILY_UNAVAILABLE => "System temporarily unavailable",
        sru::UNSUPPORTED_OPERATION => "Unsupported operation",
        sru::UNSUPPORTED_PARAMETER_VALUE => "Unsupported parameter value",
        sru::MANDATORY_PARAMETER_MISSING => "Mandatory parameter not supplied",
        sru::QUERY_SYNTAX_ERROR => "Query syntax error",
        sru::QUERY_FEATURE_UNSUPPORTED => "Query feature unsupported",
        sru::RESULT_SET_NOT_FOUND => "Result set does not exist",
        sru::FIRST_RECORD_OUT_OF_RANGE => "First record position out of range",
        sru::PRESENT_SYSTEM_ERROR => "System error in presenting records",
        sru::UNKNOWN_SCHEMA => "Unknown schema for retrieval",
        sru::RECORD_TOO_LARGE => "Record too large to send",
        sru::DATABASE_NOT_FOUND => "Database does not exist",
        _ => "Unknown diagnostic",
    }
}
