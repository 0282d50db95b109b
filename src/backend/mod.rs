//! Backend capability interface.
//!
//! A [`BackendFactory`] is shared by every association and creates one
//! [`Backend`] handle per session on Init. Handles are owned by their
//! association and never shared. Only [`Backend::search`] and
//! [`Backend::fetch`] are mandatory; every other service has a default that
//! reports "not supported" so the association stays alive.

pub mod memory;

use std::net::SocketAddr;

use crate::{
    apdu::{
        DeleteStatus,
        Diagnostic,
        EsFunction,
        EsStatus,
        ScanStatus,
        SortKey,
        SortStatus,
        TermInfo,
    },
    options::Options,
};

pub use self::memory::{DatasetError, MemoryBackend, MemoryBackendFactory};

/// What the factory learns about a new session.
#[derive(Clone, Debug, Default)]
pub struct InitInfo {
    /// Remote address of the client.
    pub peer: Option<SocketAddr>,
    /// Authentication token supplied in the Init request.
    pub authentication: Option<String>,
    /// Client implementation name.
    pub implementation_name: Option<String>,
}

/// Creates per-session backend handles.
pub trait BackendFactory: Send + Sync {
    /// Start a session.
    ///
    /// # Errors
    /// Returns the diagnostic to report when the session is refused; the
    /// Init response then carries `result = false`.
    fn init(&self, info: &InitInfo) -> Result<Box<dyn Backend>, Diagnostic>;

    /// Services this backend implements beyond search and fetch.
    fn capabilities(&self) -> Options { Options::BASELINE }
}

/// Parameters of a search.
#[derive(Clone, Copy, Debug)]
pub struct SearchArgs<'a> {
    /// Normalized prefix query.
    pub query: &'a str,
    /// Databases to search.
    pub database_names: &'a [String],
    /// Result set to create.
    pub result_set_name: &'a str,
    /// Whether an existing set of the same name may be replaced.
    pub replace: bool,
}

/// Result of a search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Hit count. Negative means unknown or failed.
    pub hits: i64,
    /// Non-surrogate diagnostic, if the search failed.
    pub diagnostic: Option<Diagnostic>,
}

impl SearchOutcome {
    /// Successful search with `hits` results.
    #[must_use]
    pub const fn hits(hits: i64) -> Self {
        Self {
            hits,
            diagnostic: None,
        }
    }

    /// Failed search.
    #[must_use]
    pub const fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            hits: 0,
            diagnostic: Some(diagnostic),
        }
    }
}

/// Parameters of a single record fetch.
#[derive(Clone, Copy, Debug)]
pub struct FetchArgs<'a> {
    /// Result set to read from.
    pub result_set_name: &'a str,
    /// 1-based position.
    pub position: u32,
    /// Requested record syntax.
    pub record_syntax: Option<&'a str>,
    /// Requested element set.
    pub element_set: Option<&'a str>,
    /// Requested schema.
    pub schema: Option<&'a str>,
}

/// A record produced by a fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedRecord {
    /// Database holding the record.
    pub database_name: Option<String>,
    /// Record syntax of `bytes`.
    pub syntax: String,
    /// Encoded record.
    pub bytes: Vec<u8>,
}

/// Result of a single record fetch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// The record; `None` with no diagnostic means end of set.
    pub record: Option<FetchedRecord>,
    /// This was the last record in the set.
    pub last_in_set: bool,
    /// Diagnostic for this fetch.
    pub diagnostic: Option<Diagnostic>,
    /// Whether `diagnostic` applies to this record only.
    pub surrogate: bool,
}

impl FetchOutcome {
    /// A fetched record.
    #[must_use]
    pub const fn record(record: FetchedRecord, last_in_set: bool) -> Self {
        Self {
            record: Some(record),
            last_in_set,
            diagnostic: None,
            surrogate: false,
        }
    }

    /// No record at this position.
    #[must_use]
    pub const fn end_of_set() -> Self {
        Self {
            record: None,
            last_in_set: false,
            diagnostic: None,
            surrogate: false,
        }
    }

    /// A diagnostic standing in for this record only.
    #[must_use]
    pub const fn surrogate(diagnostic: Diagnostic, last_in_set: bool) -> Self {
        Self {
            record: None,
            last_in_set,
            diagnostic: Some(diagnostic),
            surrogate: true,
        }
    }

    /// A diagnostic that fails the whole retrieval.
    #[must_use]
    pub const fn fatal(diagnostic: Diagnostic) -> Self {
        Self {
            record: None,
            last_in_set: false,
            diagnostic: Some(diagnostic),
            surrogate: false,
        }
    }
}

/// Parameters passed to the optional present hook.
#[derive(Clone, Copy, Debug)]
pub struct PresentArgs<'a> {
    /// Result set being presented.
    pub result_set_name: &'a str,
    /// First position.
    pub start: u32,
    /// Number of records that will be fetched.
    pub count: u32,
    /// Requested element set.
    pub element_set: Option<&'a str>,
    /// Requested record syntax.
    pub record_syntax: Option<&'a str>,
}

/// Parameters of a scan.
#[derive(Clone, Copy, Debug)]
pub struct ScanArgs<'a> {
    /// Databases to scan.
    pub database_names: &'a [String],
    /// Normalized starting term.
    pub term: &'a str,
    /// Step size between terms.
    pub step_size: u32,
    /// Number of terms wanted.
    pub number_of_terms: u32,
    /// Preferred 1-based position of the starting term.
    pub preferred_position: u32,
}

/// Result of a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Scan status.
    pub status: ScanStatus,
    /// Terms, in index order.
    pub entries: Vec<TermInfo>,
    /// 1-based position of the starting term within `entries`.
    pub position_of_term: u32,
    /// Diagnostic for failures.
    pub diagnostic: Option<Diagnostic>,
}

impl ScanOutcome {
    /// Failed scan.
    #[must_use]
    pub const fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            status: ScanStatus::Failure,
            entries: Vec::new(),
            position_of_term: 0,
            diagnostic: Some(diagnostic),
        }
    }
}

/// Parameters of a sort.
#[derive(Clone, Copy, Debug)]
pub struct SortArgs<'a> {
    /// Input result sets.
    pub input_result_sets: &'a [String],
    /// Output result set.
    pub sorted_result_set: &'a str,
    /// Keys, most significant first.
    pub keys: &'a [SortKey],
}

/// Result of a sort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortOutcome {
    /// Sort status.
    pub status: SortStatus,
    /// Size of the sorted set, when it was created.
    pub hits: Option<i64>,
    /// Diagnostic for failures.
    pub diagnostic: Option<Diagnostic>,
}

impl SortOutcome {
    /// Failed sort.
    #[must_use]
    pub const fn failed(diagnostic: Diagnostic) -> Self {
        Self {
            status: SortStatus::Failure,
            hits: None,
            diagnostic: Some(diagnostic),
        }
    }
}

/// Parameters of a result set deletion.
#[derive(Clone, Copy, Debug)]
pub struct DeleteArgs<'a> {
    /// Delete every set of the session.
    pub all: bool,
    /// Sets to delete when `all` is false.
    pub names: &'a [String],
}

/// Result of a result set deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Overall status.
    pub status: DeleteStatus,
    /// Per-set statuses.
    pub list: Vec<(String, DeleteStatus)>,
    /// Diagnostic when the service failed.
    pub diagnostic: Option<Diagnostic>,
}

/// Parameters of an extended service.
#[derive(Clone, Copy, Debug)]
pub struct EsArgs<'a> {
    /// Requested function.
    pub function: EsFunction,
    /// Package type.
    pub package_type: &'a str,
    /// Package name.
    pub package_name: Option<&'a str>,
    /// Service specific parameters.
    pub task_specific: &'a [u8],
}

/// Result of an extended service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EsOutcome {
    /// Operation status.
    pub status: EsStatus,
    /// Diagnostic for failures.
    pub diagnostic: Option<Diagnostic>,
    /// Resulting task package.
    pub task_package: Option<Vec<u8>>,
}

/// One session's view of a search backend.
pub trait Backend: Send {
    /// Run a search, creating or replacing a result set.
    fn search(&mut self, args: &SearchArgs<'_>) -> SearchOutcome;

    /// Fetch one record from a result set.
    fn fetch(&mut self, args: &FetchArgs<'_>) -> FetchOutcome;

    /// Called before records are fetched for a Present. A diagnostic fails
    /// the Present.
    fn present(&mut self, _args: &PresentArgs<'_>) -> Option<Diagnostic> { None }

    /// Browse index terms.
    fn scan(&mut self, _args: &ScanArgs<'_>) -> ScanOutcome {
        ScanOutcome::failed(Diagnostic::service_not_supported("scan"))
    }

    /// Sort result sets into a new set.
    fn sort(&mut self, _args: &SortArgs<'_>) -> SortOutcome {
        SortOutcome::failed(Diagnostic::service_not_supported("sort"))
    }

    /// Delete result sets.
    fn delete(&mut self, _args: &DeleteArgs<'_>) -> DeleteOutcome {
        DeleteOutcome {
            status: DeleteStatus::SystemProblemAtTarget,
            list: Vec::new(),
            diagnostic: Some(Diagnostic::service_not_supported("delete")),
        }
    }

    /// Run an extended service.
    fn extended_service(&mut self, _args: &EsArgs<'_>) -> EsOutcome {
        EsOutcome {
            status: EsStatus::Failure,
            diagnostic: Some(Diagnostic::service_not_supported("extended services")),
            task_package: None,
        }
    }

    /// Release the session.
    fn close(&mut self) {}
}
