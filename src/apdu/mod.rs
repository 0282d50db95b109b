//! Protocol data units exchanged on the binary variant.
//!
//! Every request and response the engine understands is a variant of
//! [`Apdu`]. The types derive `bincode` encoding; the byte layout is private
//! to this crate and only the [`codec`](crate::codec) module turns them into
//! bytes. Field names follow the classic Z39.50 service definitions.

pub mod diagnostic;

use bincode::{Decode, Encode};

pub use self::diagnostic::Diagnostic;

/// Opaque client-chosen identifier echoed on every response.
pub type ReferenceId = Option<Vec<u8>>;

/// A protocol data unit.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Apdu {
    /// Session initialisation request.
    InitRequest(InitRequest),
    /// Session initialisation response.
    InitResponse(InitResponse),
    /// Search request.
    SearchRequest(SearchRequest),
    /// Search response.
    SearchResponse(SearchResponse),
    /// Present (retrieve) request.
    PresentRequest(PresentRequest),
    /// Present response.
    PresentResponse(PresentResponse),
    /// Scan (browse terms) request.
    ScanRequest(ScanRequest),
    /// Scan response.
    ScanResponse(ScanResponse),
    /// Sort request.
    SortRequest(SortRequest),
    /// Sort response.
    SortResponse(SortResponse),
    /// Delete result set request.
    DeleteResultSetRequest(DeleteResultSetRequest),
    /// Delete result set response.
    DeleteResultSetResponse(DeleteResultSetResponse),
    /// Extended services request.
    ExtendedServicesRequest(ExtendedServicesRequest),
    /// Extended services response.
    ExtendedServicesResponse(ExtendedServicesResponse),
    /// Close, sent by either side.
    Close(Close),
}

impl Apdu {
    /// Short name of the APDU kind, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InitRequest(_) => "initRequest",
            Self::InitResponse(_) => "initResponse",
            Self::SearchRequest(_) => "searchRequest",
            Self::SearchResponse(_) => "searchResponse",
            Self::PresentRequest(_) => "presentRequest",
            Self::PresentResponse(_) => "presentResponse",
            Self::ScanRequest(_) => "scanRequest",
            Self::ScanResponse(_) => "scanResponse",
            Self::SortRequest(_) => "sortRequest",
            Self::SortResponse(_) => "sortResponse",
            Self::DeleteResultSetRequest(_) => "deleteResultSetRequest",
            Self::DeleteResultSetResponse(_) => "deleteResultSetResponse",
            Self::ExtendedServicesRequest(_) => "extendedServicesRequest",
            Self::ExtendedServicesResponse(_) => "extendedServicesResponse",
            Self::Close(_) => "close",
        }
    }

    /// The reference identifier carried by this APDU.
    #[must_use]
    pub fn reference_id(&self) -> Option<&[u8]> {
        let id = match self {
            Self::InitRequest(p) => &p.reference_id,
            Self::InitResponse(p) => &p.reference_id,
            Self::SearchRequest(p) => &p.reference_id,
            Self::SearchResponse(p) => &p.reference_id,
            Self::PresentRequest(p) => &p.reference_id,
            Self::PresentResponse(p) => &p.reference_id,
            Self::ScanRequest(p) => &p.reference_id,
            Self::ScanResponse(p) => &p.reference_id,
            Self::SortRequest(p) => &p.reference_id,
            Self::SortResponse(p) => &p.reference_id,
            Self::DeleteResultSetRequest(p) => &p.reference_id,
            Self::DeleteResultSetResponse(p) => &p.reference_id,
            Self::ExtendedServicesRequest(p) => &p.reference_id,
            Self::ExtendedServicesResponse(p) => &p.reference_id,
            Self::Close(p) => &p.reference_id,
        };
        id.as_deref()
    }
}

/// Query forms accepted by Search and Scan.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum Query {
    /// Already normalized prefix query, passed to the backend unchanged.
    Prefix(String),
    /// Keyword/boolean query text needing translation.
    Keyword(String),
    /// Contextual query language text needing translation.
    Contextual(String),
}

impl Query {
    /// The raw query text regardless of form.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Prefix(text) | Self::Keyword(text) | Self::Contextual(text) => text,
        }
    }

    /// Whether the query is already in normalized form.
    #[must_use]
    pub const fn is_normalized(&self) -> bool { matches!(self, Self::Prefix(_)) }
}

/// Init request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct InitRequest {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Protocol versions the client supports.
    pub protocol_versions: Vec<u8>,
    /// Proposed service options, as [`Options`](crate::options::Options) bits.
    pub options: u32,
    /// Proposed preferred message size (0 = no preference).
    pub preferred_message_size: u32,
    /// Proposed exceptional record size (0 = no preference).
    pub maximum_record_size: u32,
    /// Authentication token, if any.
    pub authentication: Option<String>,
    /// Client implementation identifier.
    pub implementation_id: Option<String>,
    /// Client implementation name.
    pub implementation_name: Option<String>,
    /// Client implementation version.
    pub implementation_version: Option<String>,
}

/// Init response.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct InitResponse {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Negotiated protocol version.
    pub protocol_version: u8,
    /// Agreed service options.
    pub options: u32,
    /// Negotiated preferred message size.
    pub preferred_message_size: u32,
    /// Negotiated exceptional record size.
    pub maximum_record_size: u32,
    /// Whether the Init was accepted.
    pub result: bool,
    /// Server implementation identifier.
    pub implementation_id: String,
    /// Server implementation name.
    pub implementation_name: String,
    /// Server implementation version.
    pub implementation_version: String,
    /// Reason for rejection.
    pub diagnostic: Option<Diagnostic>,
}

/// Search request.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SearchRequest {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Hit counts up to this bound are piggybacked in full.
    pub small_set_upper_bound: u32,
    /// Hit counts at or above this bound are never piggybacked.
    pub large_set_lower_bound: u32,
    /// Records piggybacked for medium-sized sets.
    pub medium_set_present_number: u32,
    /// Whether an existing result set of the same name may be replaced.
    pub replace_indicator: bool,
    /// Name of the result set to create.
    pub result_set_name: String,
    /// Databases to search.
    pub database_names: Vec<String>,
    /// Element set for small-set piggyback.
    pub small_set_element_set: Option<String>,
    /// Element set for medium-set piggyback.
    pub medium_set_element_set: Option<String>,
    /// Record syntax for piggybacked records.
    pub preferred_record_syntax: Option<String>,
    /// The query.
    pub query: Query,
}

/// Present status of a record-bearing response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum PresentStatus {
    /// All requested records returned.
    Success,
    /// Some records withheld by access control.
    PartialAccessControl,
    /// Stopped because the preferred message size was reached.
    PartialMessageSize,
    /// Stopped by resource control.
    PartialResourceControl,
    /// Stopped because the result set ended early.
    PartialEndOfSet,
    /// No records returned; a non-surrogate diagnostic explains why.
    Failure,
}

/// A record or a per-record diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum RecordEntry {
    /// Retrieved record.
    Retrieval(ExternalRecord),
    /// Surrogate diagnostic standing in for a record.
    SurrogateDiagnostic(Diagnostic),
}

/// Record bytes tagged with their syntax.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ExternalRecord {
    /// Record syntax name (`json`, `xml`, ...).
    pub syntax: String,
    /// Encoded record.
    pub bytes: Vec<u8>,
}

/// One entry of a record list.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct NamePlusRecord {
    /// Database the record came from.
    pub database_name: Option<String>,
    /// The record or its diagnostic.
    pub record: RecordEntry,
}

/// Record list or a single diagnostic replacing it.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum Records {
    /// Records (possibly including surrogate diagnostics).
    ResponseRecords(Vec<NamePlusRecord>),
    /// Whole-operation diagnostic.
    NonSurrogateDiagnostic(Diagnostic),
}

/// Search response.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SearchResponse {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Number of hits; never negative on the wire.
    pub result_count: i64,
    /// Number of piggybacked records.
    pub number_of_records_returned: u32,
    /// Next position to present, 0 when none remain.
    pub next_result_set_position: u32,
    /// Whether the search succeeded.
    pub search_status: bool,
    /// Present status of piggybacked records.
    pub present_status: Option<PresentStatus>,
    /// Piggybacked records or the search diagnostic.
    pub records: Option<Records>,
}

/// Present request.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PresentRequest {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Result set to retrieve from.
    pub result_set_id: String,
    /// First position (1-based).
    pub start_point: u32,
    /// Number of records requested.
    pub number_of_records: u32,
    /// Element set name.
    pub element_set_name: Option<String>,
    /// Requested record syntax.
    pub preferred_record_syntax: Option<String>,
    /// Requested schema.
    pub schema: Option<String>,
}

/// Present response.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct PresentResponse {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Number of entries in `records`.
    pub number_of_records_returned: u32,
    /// Next position to present, 0 when none remain.
    pub next_result_set_position: u32,
    /// Present status.
    pub present_status: PresentStatus,
    /// Records or the diagnostic replacing them.
    pub records: Option<Records>,
}

/// Scan request.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ScanRequest {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Databases to scan.
    pub database_names: Vec<String>,
    /// Starting term, in any query form.
    pub term: Query,
    /// Step size between terms.
    pub step_size: u32,
    /// Number of terms requested.
    pub number_of_terms: u32,
    /// Preferred position of the starting term in the response (1-based).
    pub preferred_position: u32,
}

/// Scan outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum ScanStatus {
    /// All requested terms returned.
    Success,
    /// Fewer terms than requested.
    Partial,
    /// Scan failed.
    Failure,
}

/// One scanned term.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct TermInfo {
    /// The term.
    pub term: String,
    /// Number of records containing it.
    pub occurrences: u64,
    /// Optional display form.
    pub display_term: Option<String>,
}

/// Scan response.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ScanResponse {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Step size actually used.
    pub step_size: u32,
    /// Scan status.
    pub scan_status: ScanStatus,
    /// Number of entries returned.
    pub number_of_entries: u32,
    /// Position of the starting term within `entries`.
    pub position_of_term: u32,
    /// Scanned terms.
    pub entries: Vec<TermInfo>,
    /// Diagnostic for failures.
    pub diagnostic: Option<Diagnostic>,
}

/// A sort key.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SortKey {
    /// Field or element to sort on.
    pub field: String,
    /// Ascending when true.
    pub ascending: bool,
}

/// Sort request.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SortRequest {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Result sets to sort.
    pub input_result_sets: Vec<String>,
    /// Name of the sorted result set.
    pub sorted_result_set: String,
    /// Sort keys, most significant first.
    pub sort_keys: Vec<SortKey>,
}

/// Sort outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum SortStatus {
    /// Sorted.
    Success,
    /// Partially sorted.
    Partial,
    /// Not sorted.
    Failure,
}

/// Sort response.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct SortResponse {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Sort status.
    pub status: SortStatus,
    /// Diagnostics explaining a failure.
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-set outcome of Delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum DeleteStatus {
    /// Deleted.
    Success,
    /// No such result set.
    ResultSetDidNotExist,
    /// Already deleted by the server.
    PreviouslyDeletedByTarget,
    /// Server-side failure.
    SystemProblemAtTarget,
    /// Not allowed.
    AccessNotAllowed,
}

/// Delete result set request.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct DeleteResultSetRequest {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Delete every result set of the association.
    pub delete_all: bool,
    /// Result sets to delete when `delete_all` is false.
    pub result_sets: Vec<String>,
}

/// Delete result set response.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct DeleteResultSetResponse {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Overall status.
    pub status: DeleteStatus,
    /// Per-set statuses.
    pub list_statuses: Vec<(String, DeleteStatus)>,
    /// Diagnostic when the service itself failed.
    pub diagnostic: Option<Diagnostic>,
}

/// Extended service function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum EsFunction {
    /// Create a task package.
    Create,
    /// Delete a task package.
    Delete,
    /// Modify a task package.
    Modify,
}

/// Extended services request.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ExtendedServicesRequest {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Requested function.
    pub function: EsFunction,
    /// Package type (for example `itemorder` or `update`).
    pub package_type: String,
    /// Optional package name.
    pub package_name: Option<String>,
    /// Service specific parameters.
    pub task_specific: Vec<u8>,
}

/// Extended services outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum EsStatus {
    /// Completed.
    Done,
    /// Accepted for later processing.
    Accepted,
    /// Failed.
    Failure,
}

/// Extended services response.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ExtendedServicesResponse {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Operation status.
    pub operation_status: EsStatus,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
    /// Resulting task package.
    pub task_package: Option<Vec<u8>>,
}

/// Reason carried by `Close`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode)]
pub enum CloseReason {
    /// Normal end of session.
    Finished,
    /// Server is shutting down.
    Shutdown,
    /// System problem.
    SystemProblem,
    /// Cost limit reached.
    CostLimit,
    /// Resources exhausted.
    Resources,
    /// Security violation.
    SecurityViolation,
    /// The peer violated the protocol.
    ProtocolError,
    /// Idle for too long.
    LackOfActivity,
    /// Peer aborted.
    PeerAbort,
    /// No reason given.
    Unspecified,
}

/// Close.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Close {
    /// Echoed reference identifier.
    pub reference_id: ReferenceId,
    /// Why the session is closing.
    pub reason: CloseReason,
    /// Free-form detail.
    pub diagnostic_information: Option<String>,
}

impl Close {
    /// Build a `Close` with the given reason.
    #[must_use]
    pub const fn new(reason: CloseReason) -> Self {
        Self {
            reference_id: None,
            reason,
            diagnostic_information: None,
        }
    }
}
