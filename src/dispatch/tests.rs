//! Tests for request dispatch.

use std::sync::Arc;

use rstest::{fixture, rstest};

use super::*;
use crate::{
    apdu::{
        Close,
        CloseReason,
        DeleteResultSetRequest,
        DeleteResultSetResponse,
        DeleteStatus,
        EsFunction,
        ExtendedServicesRequest,
        InitRequest,
        PresentRequest,
        PresentResponse,
        PresentStatus,
        Query,
        Records,
        ScanRequest,
        SearchRequest,
        SearchResponse,
        SortKey,
        SortRequest,
        diagnostic::bib1,
    },
    backend::{
        BackendFactory,
        FetchArgs,
        FetchOutcome,
        FetchedRecord,
        MemoryBackendFactory,
        SearchArgs,
        SearchOutcome,
        memory::Dataset,
    },
};

/// Backend reporting a fixed hit count with small numbered records.
struct Scripted {
    hits: i64,
}

impl Backend for Scripted {
    fn search(&mut self, _: &SearchArgs<'_>) -> SearchOutcome { SearchOutcome::hits(self.hits) }

    fn fetch(&mut self, args: &FetchArgs<'_>) -> FetchOutcome {
        if i64::from(args.position) > self.hits {
            return FetchOutcome::end_of_set();
        }
        let record = FetchedRecord {
            database_name: Some("Default".to_owned()),
            syntax: "json".to_owned(),
            bytes: format!("{{\"n\":{}}}", args.position).into_bytes(),
        };
        FetchOutcome::record(record, i64::from(args.position) == self.hits)
    }
}

struct ScriptedFactory {
    hits: i64,
    refuse: bool,
}

impl BackendFactory for ScriptedFactory {
    fn init(&self, _: &InitInfo) -> Result<Box<dyn Backend>, Diagnostic> {
        if self.refuse {
            return Err(Diagnostic::with_addinfo(bib1::PERMANENT_SYSTEM_ERROR, "go away"));
        }
        Ok(Box::new(Scripted { hits: self.hits }))
    }
}

fn scripted(hits: i64) -> EngineConfig {
    EngineConfig::new(Arc::new(ScriptedFactory {
        hits,
        refuse: false,
    }))
}

#[fixture]
fn memory() -> EngineConfig {
    EngineConfig::new(Arc::new(MemoryBackendFactory::new(Dataset::sample())))
}

fn init_request(versions: &[u8], options: Options) -> Apdu {
    Apdu::InitRequest(InitRequest {
        reference_id: Some(b"init".to_vec()),
        protocol_versions: versions.to_vec(),
        options: options.bits(),
        ..InitRequest::default()
    })
}

fn establish(cfg: &EngineConfig, versions: &[u8], options: Options) -> Session {
    let mut session = Session::new(None);
    let outcome = handle_apdu(cfg, &mut session, init_request(versions, options));
    assert!(matches!(outcome, Outcome::Established(_)), "{outcome:?}");
    session
}

fn search_request(query: &str) -> SearchRequest {
    SearchRequest {
        reference_id: Some(b"search".to_vec()),
        small_set_upper_bound: 0,
        large_set_lower_bound: 1,
        medium_set_present_number: 0,
        replace_indicator: true,
        result_set_name: String::new(),
        database_names: vec!["Default".to_owned()],
        small_set_element_set: None,
        medium_set_element_set: None,
        preferred_record_syntax: None,
        query: Query::Prefix(query.to_owned()),
    }
}

fn present_request(start_point: u32, number_of_records: u32) -> PresentRequest {
    PresentRequest {
        reference_id: Some(b"present".to_vec()),
        result_set_id: String::new(),
        start_point,
        number_of_records,
        element_set_name: None,
        preferred_record_syntax: None,
        schema: None,
    }
}

fn search(cfg: &EngineConfig, session: &mut Session, req: SearchRequest) -> SearchResponse {
    match handle_apdu(cfg, session, Apdu::SearchRequest(req)) {
        Outcome::Reply(Apdu::SearchResponse(resp)) => resp,
        other => panic!("expected search response, got {other:?}"),
    }
}

fn present(cfg: &EngineConfig, session: &mut Session, req: PresentRequest) -> PresentResponse {
    match handle_apdu(cfg, session, Apdu::PresentRequest(req)) {
        Outcome::Reply(Apdu::PresentResponse(resp)) => resp,
        other => panic!("expected present response, got {other:?}"),
    }
}

fn non_surrogate_code(records: Option<&Records>) -> Option<u32> {
    match records {
        Some(Records::NonSurrogateDiagnostic(diag)) => Some(diag.code),
        _ => None,
    }
}

#[rstest]
fn init_negotiates_version_options_and_sizes(memory: EngineConfig) {
    let mut session = Session::new(None);
    let request = Apdu::InitRequest(InitRequest {
        reference_id: Some(b"r1".to_vec()),
        protocol_versions: vec![1, 2, 3],
        options: Options::all().bits(),
        preferred_message_size: 4096,
        maximum_record_size: 0,
        ..InitRequest::default()
    });
    let Outcome::Established(Apdu::InitResponse(resp)) = handle_apdu(&memory, &mut session, request)
    else {
        panic!("init was not accepted");
    };
    assert!(resp.result);
    assert_eq!(resp.reference_id.as_deref(), Some(b"r1".as_slice()));
    assert_eq!(resp.protocol_version, protocol::VERSION_3);
    assert_eq!(resp.preferred_message_size, 4096);
    assert_eq!(resp.maximum_record_size, memory.maximum_record_size);
    assert_eq!(resp.implementation_id, protocol::IMPLEMENTATION_ID);
    let agreed = Options::from_bits_truncate(resp.options);
    assert!(agreed.allows_scan());
    assert!(!agreed.contains(Options::EXTENDED_SERVICES));
    assert!(session.is_established());
    assert!(session.supports_close());
    assert_eq!(session.preferred_message_size(), 4096);
}

#[rstest]
fn init_without_common_version_is_rejected(memory: EngineConfig) {
    let mut session = Session::new(None);
    let outcome = handle_apdu(&memory, &mut session, init_request(&[7], Options::SEARCH));
    let Outcome::Closing(Apdu::InitResponse(resp)) = outcome else {
        panic!("expected rejecting init response, got {outcome:?}");
    };
    assert!(!resp.result);
    assert!(resp.diagnostic.is_some());
    assert!(!session.is_established());
}

#[test]
fn init_refused_by_backend_closes() {
    let cfg = EngineConfig::new(Arc::new(ScriptedFactory {
        hits: 0,
        refuse: true,
    }));
    let mut session = Session::new(None);
    let outcome = handle_apdu(&cfg, &mut session, init_request(&[3], Options::SEARCH));
    let Outcome::Closing(Apdu::InitResponse(resp)) = outcome else {
        panic!("expected rejecting init response, got {outcome:?}");
    };
    assert!(!resp.result);
    assert_eq!(
        resp.diagnostic.and_then(|d| d.addinfo),
        Some("go away".to_owned())
    );
    assert!(!session.is_established());
}

#[rstest]
fn request_before_init_is_a_protocol_error(memory: EngineConfig) {
    let mut session = Session::new(None);
    let outcome = handle_apdu(&memory, &mut session, Apdu::SearchRequest(search_request("x")));
    assert!(matches!(outcome, Outcome::ProtocolError(_)));
}

#[rstest]
fn repeated_init_is_a_protocol_error(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE);
    let outcome = handle_apdu(&memory, &mut session, init_request(&[3], Options::BASELINE));
    assert!(matches!(outcome, Outcome::ProtocolError(_)));
}

#[rstest]
fn responses_from_clients_are_protocol_errors(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE);
    let reply = search(&memory, &mut session, search_request("tide"));
    let outcome = handle_apdu(&memory, &mut session, Apdu::SearchResponse(reply));
    assert!(matches!(outcome, Outcome::ProtocolError(_)));
}

#[test]
fn negative_hit_count_becomes_failed_search() {
    let cfg = scripted(-1);
    let mut session = establish(&cfg, &[3], Options::BASELINE);
    let resp = search(&cfg, &mut session, search_request("anything"));
    assert_eq!(resp.result_count, 0);
    assert!(!resp.search_status);
    assert_eq!(resp.number_of_records_returned, 0);
    assert_eq!(
        non_surrogate_code(resp.records.as_ref()),
        Some(bib1::TEMPORARY_SYSTEM_ERROR)
    );
    assert_eq!(session.result_set(protocol::DEFAULT_RESULT_SET), None);
}

#[rstest]
#[case::small_set(3, 5, 10, 2, 3, 0)]
#[case::medium_set(8, 5, 10, 2, 2, 3)]
#[case::medium_capped_by_hits(7, 5, 10, 20, 7, 0)]
#[case::large_set(30, 5, 10, 2, 0, 1)]
#[case::empty(0, 5, 10, 2, 0, 0)]
fn piggyback_follows_set_bounds(
    #[case] hits: i64,
    #[case] small: u32,
    #[case] large: u32,
    #[case] medium: u32,
    #[case] expected_returned: u32,
    #[case] expected_next: u32,
) {
    let cfg = scripted(hits);
    let mut session = establish(&cfg, &[3], Options::BASELINE);
    let mut req = search_request("q");
    req.small_set_upper_bound = small;
    req.large_set_lower_bound = large;
    req.medium_set_present_number = medium;
    let resp = search(&cfg, &mut session, req);
    assert!(resp.search_status);
    assert_eq!(resp.result_count, hits);
    assert_eq!(resp.number_of_records_returned, expected_returned);
    assert_eq!(resp.next_result_set_position, expected_next);
    assert_eq!(session.last_record_seen(), expected_returned);
}

#[rstest]
fn search_records_named_result_set(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE);
    let mut req = search_request("@attr 1=1003 ames");
    req.result_set_name = "by-author".to_owned();
    let resp = search(&memory, &mut session, req);
    assert_eq!(resp.result_count, 2);
    assert_eq!(resp.reference_id.as_deref(), Some(b"search".as_slice()));
    assert_eq!(session.result_set("by-author"), Some(2));
}

#[rstest]
fn search_without_databases_fails(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE);
    let mut req = search_request("tide");
    req.database_names.clear();
    let resp = search(&memory, &mut session, req);
    assert!(!resp.search_status);
    assert_eq!(
        non_surrogate_code(resp.records.as_ref()),
        Some(bib1::DATABASE_NOT_FOUND)
    );
}

#[rstest]
#[case::missing_set(false, 1, bib1::RESULT_SET_NOT_FOUND)]
#[case::start_zero(true, 0, bib1::PRESENT_OUT_OF_RANGE)]
#[case::start_past_end(true, 6, bib1::PRESENT_OUT_OF_RANGE)]
fn present_rejects_bad_requests(#[case] searched: bool, #[case] start: u32, #[case] code: u32) {
    let cfg = scripted(5);
    let mut session = establish(&cfg, &[3], Options::BASELINE);
    if searched {
        search(&cfg, &mut session, search_request("q"));
    }
    let resp = present(&cfg, &mut session, present_request(start, 1));
    assert_eq!(resp.present_status, PresentStatus::Failure);
    assert_eq!(resp.number_of_records_returned, 0);
    assert_eq!(resp.next_result_set_position, 0);
    assert_eq!(non_surrogate_code(resp.records.as_ref()), Some(code));
}

#[test]
fn present_clamps_count_to_end_of_set() {
    let cfg = scripted(5);
    let mut session = establish(&cfg, &[3], Options::BASELINE);
    search(&cfg, &mut session, search_request("q"));
    let resp = present(&cfg, &mut session, present_request(4, 10));
    assert_eq!(resp.present_status, PresentStatus::Success);
    assert_eq!(resp.number_of_records_returned, 2);
    assert_eq!(resp.next_result_set_position, 0);
    assert_eq!(resp.reference_id.as_deref(), Some(b"present".as_slice()));
    assert_eq!(session.last_record_seen(), 5);
}

#[test]
fn present_continues_mid_set() {
    let cfg = scripted(5);
    let mut session = establish(&cfg, &[3], Options::BASELINE);
    search(&cfg, &mut session, search_request("q"));
    let resp = present(&cfg, &mut session, present_request(1, 2));
    assert_eq!(resp.number_of_records_returned, 2);
    assert_eq!(resp.next_result_set_position, 3);
}

#[rstest]
fn scan_requires_agreed_option(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE);
    let req = ScanRequest {
        reference_id: Some(b"scan".to_vec()),
        database_names: vec!["Default".to_owned()],
        term: Query::Prefix("water".to_owned()),
        step_size: 0,
        number_of_terms: 3,
        preferred_position: 1,
    };
    let Outcome::Reply(Apdu::ScanResponse(resp)) =
        handle_apdu(&memory, &mut session, Apdu::ScanRequest(req))
    else {
        panic!("expected scan response");
    };
    assert_eq!(resp.scan_status, crate::apdu::ScanStatus::Failure);
    assert_eq!(resp.diagnostic.map(|d| d.code), Some(bib1::UNSUPPORTED_SEARCH));
    assert_eq!(resp.reference_id.as_deref(), Some(b"scan".as_slice()));
}

#[rstest]
fn scan_lists_terms_when_agreed(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE | Options::SCAN);
    let req = ScanRequest {
        reference_id: None,
        database_names: vec!["Default".to_owned()],
        term: Query::Prefix("water".to_owned()),
        step_size: 0,
        number_of_terms: 1,
        preferred_position: 1,
    };
    let Outcome::Reply(Apdu::ScanResponse(resp)) =
        handle_apdu(&memory, &mut session, Apdu::ScanRequest(req))
    else {
        panic!("expected scan response");
    };
    assert_eq!(resp.number_of_entries, 1);
    assert_eq!(resp.entries.first().map(|e| e.term.as_str()), Some("water"));
}

#[rstest]
fn sort_requires_agreed_option(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE);
    let req = SortRequest {
        reference_id: Some(b"sort".to_vec()),
        input_result_sets: vec!["default".to_owned()],
        sorted_result_set: "sorted".to_owned(),
        sort_keys: vec![SortKey {
            field: "title".to_owned(),
            ascending: true,
        }],
    };
    let Outcome::Reply(Apdu::SortResponse(resp)) =
        handle_apdu(&memory, &mut session, Apdu::SortRequest(req))
    else {
        panic!("expected sort response");
    };
    assert_eq!(resp.status, crate::apdu::SortStatus::Failure);
    let diag = resp.diagnostics.first().cloned();
    assert_eq!(diag.as_ref().map(|d| d.code), Some(bib1::PERMANENT_SYSTEM_ERROR));
    assert_eq!(
        diag.and_then(|d| d.addinfo),
        Some("sort not supported".to_owned())
    );
}

#[rstest]
fn sort_creates_presentable_set(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE | Options::SORT);
    search(&memory, &mut session, search_request("water"));
    let req = SortRequest {
        reference_id: None,
        input_result_sets: vec![protocol::DEFAULT_RESULT_SET.to_owned()],
        sorted_result_set: "sorted".to_owned(),
        sort_keys: vec![SortKey {
            field: "year".to_owned(),
            ascending: false,
        }],
    };
    let outcome = handle_apdu(&memory, &mut session, Apdu::SortRequest(req));
    assert!(matches!(outcome, Outcome::Reply(Apdu::SortResponse(_))));
    assert_eq!(
        session.result_set("sorted"),
        session.result_set(protocol::DEFAULT_RESULT_SET)
    );
}

fn delete(
    cfg: &EngineConfig,
    session: &mut Session,
    req: DeleteResultSetRequest,
) -> DeleteResultSetResponse {
    match handle_apdu(cfg, session, Apdu::DeleteResultSetRequest(req)) {
        Outcome::Reply(Apdu::DeleteResultSetResponse(resp)) => resp,
        other => panic!("expected delete response, got {other:?}"),
    }
}

fn named_search(name: &str, query: &str) -> SearchRequest {
    let mut req = search_request(query);
    req.result_set_name = name.to_owned();
    req
}

#[rstest]
fn deleted_set_is_forgotten(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::all());
    search(&memory, &mut session, named_search("salt", "water"));
    search(&memory, &mut session, named_search("tide", "tide"));
    let resp = delete(
        &memory,
        &mut session,
        DeleteResultSetRequest {
            reference_id: Some(b"del".to_vec()),
            delete_all: false,
            result_sets: vec!["salt".to_owned()],
        },
    );
    assert_eq!(resp.status, DeleteStatus::Success);
    assert_eq!(resp.reference_id.as_deref(), Some(b"del".as_slice()));
    assert_eq!(resp.list_statuses, vec![("salt".to_owned(), DeleteStatus::Success)]);
    assert_eq!(session.result_set("salt"), None);
    assert_eq!(session.result_set("tide"), Some(1));

    let mut req = present_request(1, 1);
    req.result_set_id = "salt".to_owned();
    let after = present(&memory, &mut session, req);
    assert_eq!(after.present_status, PresentStatus::Failure);
    assert_eq!(non_surrogate_code(after.records.as_ref()), Some(bib1::RESULT_SET_NOT_FOUND));
}

#[rstest]
fn delete_all_forgets_every_set(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::all());
    search(&memory, &mut session, named_search("salt", "water"));
    search(&memory, &mut session, named_search("tide", "tide"));
    let resp = delete(
        &memory,
        &mut session,
        DeleteResultSetRequest {
            reference_id: None,
            delete_all: true,
            result_sets: Vec::new(),
        },
    );
    assert_eq!(resp.status, DeleteStatus::Success);
    assert_eq!(session.result_set("salt"), None);
    assert_eq!(session.result_set("tide"), None);
}

#[rstest]
fn deleting_unknown_set_reports_it(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::all());
    search(&memory, &mut session, named_search("salt", "water"));
    let resp = delete(
        &memory,
        &mut session,
        DeleteResultSetRequest {
            reference_id: None,
            delete_all: false,
            result_sets: vec!["missing".to_owned()],
        },
    );
    assert_eq!(resp.status, DeleteStatus::ResultSetDidNotExist);
    assert_eq!(session.result_set("salt"), Some(2));
}

#[rstest]
fn delete_requires_agreed_option(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE);
    search(&memory, &mut session, named_search("salt", "water"));
    let resp = delete(
        &memory,
        &mut session,
        DeleteResultSetRequest {
            reference_id: None,
            delete_all: true,
            result_sets: Vec::new(),
        },
    );
    assert_eq!(resp.diagnostic.map(|d| d.code), Some(bib1::PERMANENT_SYSTEM_ERROR));
    assert_eq!(session.result_set("salt"), Some(2));
}

#[rstest]
fn extended_services_need_agreed_option(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::all());
    let req = ExtendedServicesRequest {
        reference_id: Some(b"es".to_vec()),
        function: EsFunction::Create,
        package_type: "itemorder".to_owned(),
        package_name: None,
        task_specific: Vec::new(),
    };
    let Outcome::Reply(Apdu::ExtendedServicesResponse(resp)) =
        handle_apdu(&memory, &mut session, Apdu::ExtendedServicesRequest(req))
    else {
        panic!("expected extended services response");
    };
    assert_eq!(resp.diagnostics.first().map(|d| d.code), Some(bib1::PERMANENT_SYSTEM_ERROR));
    assert_eq!(resp.reference_id.as_deref(), Some(b"es".as_slice()));
}

#[rstest]
fn close_is_acknowledged_on_version_three(memory: EngineConfig) {
    let mut session = establish(&memory, &[3], Options::BASELINE);
    search(&memory, &mut session, search_request("tide"));
    let mut close = Close::new(CloseReason::Finished);
    close.reference_id = Some(b"bye".to_vec());
    let Outcome::Closing(Apdu::Close(reply)) = handle_apdu(&memory, &mut session, Apdu::Close(close))
    else {
        panic!("expected close reply");
    };
    assert_eq!(reply.reason, CloseReason::Finished);
    assert_eq!(reply.reference_id.as_deref(), Some(b"bye".as_slice()));
    assert_eq!(session.result_set(protocol::DEFAULT_RESULT_SET), None);
}

#[rstest]
fn close_before_version_three_is_a_protocol_error(memory: EngineConfig) {
    let mut session = establish(&memory, &[1, 2], Options::BASELINE);
    let outcome = handle_apdu(
        &memory,
        &mut session,
        Apdu::Close(Close::new(CloseReason::Finished)),
    );
    assert!(matches!(outcome, Outcome::ProtocolError(_)));
}
