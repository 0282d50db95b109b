//! Per-operation request handlers.

use tracing::{debug, info};

use super::{Outcome, Session};
use crate::{
    apdu::{
        Apdu,
        Close,
        CloseReason,
        DeleteResultSetRequest,
        DeleteResultSetResponse,
        DeleteStatus,
        Diagnostic,
        EsStatus,
        ExtendedServicesRequest,
        ExtendedServicesResponse,
        InitRequest,
        InitResponse,
        PresentRequest,
        PresentResponse,
        PresentStatus,
        Records,
        ReferenceId,
        ScanRequest,
        ScanResponse,
        ScanStatus,
        SearchRequest,
        SearchResponse,
        SortRequest,
        SortResponse,
        SortStatus,
        diagnostic::bib1,
    },
    backend::{DeleteArgs, EsArgs, InitInfo, PresentArgs, ScanArgs, SearchArgs, SortArgs},
    engine::EngineConfig,
    options::Options,
    packer::{self, PackRequest, PackedResponse},
    protocol,
};

fn result_set_name(name: &str) -> &str {
    if name.is_empty() {
        protocol::DEFAULT_RESULT_SET
    } else {
        name
    }
}

fn size(value: u32) -> usize { usize::try_from(value).unwrap_or(usize::MAX) }

fn init_response(
    cfg: &EngineConfig,
    reference_id: ReferenceId,
    protocol_version: u8,
    result: Result<(Options, u32, u32), Diagnostic>,
) -> InitResponse {
    let (options, preferred, maximum, diagnostic) = match result {
        Ok((options, preferred, maximum)) => (options.bits(), preferred, maximum, None),
        Err(diagnostic) => (0, 0, 0, Some(diagnostic)),
    };
    InitResponse {
        reference_id,
        protocol_version,
        options,
        preferred_message_size: preferred,
        maximum_record_size: maximum,
        result: diagnostic.is_none(),
        implementation_id: protocol::IMPLEMENTATION_ID.to_owned(),
        implementation_name: cfg.implementation_name.clone(),
        implementation_version: protocol::IMPLEMENTATION_VERSION.to_owned(),
        diagnostic,
    }
}

pub(super) fn init(cfg: &EngineConfig, session: &mut Session, req: InitRequest) -> Outcome {
    let Some(version) = protocol::negotiate_version(&req.protocol_versions) else {
        info!(peer = ?session.peer, offered = ?req.protocol_versions, "no common protocol version");
        let diag = Diagnostic::with_addinfo(bib1::PERMANENT_SYSTEM_ERROR, "no common protocol version");
        let response = init_response(cfg, req.reference_id, 0, Err(diag));
        return Outcome::Closing(Apdu::InitResponse(response));
    };
    let info = InitInfo {
        peer: session.peer,
        authentication: req.authentication,
        implementation_name: req.implementation_name,
    };
    let backend = match cfg.backend.init(&info) {
        Ok(backend) => backend,
        Err(diag) => {
            info!(peer = ?session.peer, %diag, "backend refused session");
            let response = init_response(cfg, req.reference_id, version, Err(diag));
            return Outcome::Closing(Apdu::InitResponse(response));
        }
    };
    let options = Options::from_bits_truncate(req.options).negotiate(cfg.backend.capabilities());
    let preferred = protocol::negotiate_size(req.preferred_message_size, cfg.preferred_message_size);
    let maximum = protocol::negotiate_size(req.maximum_record_size, cfg.maximum_record_size);
    session.version = Some(version);
    session.options = options;
    session.preferred_message_size = preferred;
    session.maximum_record_size = maximum;
    session.backend = Some(backend);
    info!(
        peer = ?session.peer,
        version,
        preferred,
        maximum,
        options = ?options,
        "session established"
    );
    let response = init_response(cfg, req.reference_id, version, Ok((options, preferred, maximum)));
    Outcome::Established(Apdu::InitResponse(response))
}

fn failed_search(reference_id: ReferenceId, diagnostic: Diagnostic) -> SearchResponse {
    SearchResponse {
        reference_id,
        result_count: 0,
        number_of_records_returned: 0,
        next_result_set_position: 0,
        search_status: false,
        present_status: None,
        records: Some(Records::NonSurrogateDiagnostic(diagnostic)),
    }
}

fn pack_request<'a>(
    session: &Session,
    name: &'a str,
    start: u32,
    count: u32,
    record_syntax: Option<&'a str>,
    element_set: Option<&'a str>,
    schema: Option<&'a str>,
) -> PackRequest<'a> {
    PackRequest {
        result_set_name: name,
        start,
        count,
        byte_budget: size(session.preferred_message_size),
        maximum_record_size: size(session.maximum_record_size),
        record_syntax,
        element_set,
        schema,
    }
}

fn note_presented(session: &mut Session, start: u32, packed: &PackedResponse) {
    if packed.count_returned > 0 {
        session.last_record_seen = start.saturating_add(packed.count_returned - 1);
    }
}

pub(super) fn search(cfg: &EngineConfig, session: &mut Session, req: &SearchRequest) -> SearchResponse {
    let reference_id = req.reference_id.clone();
    if req.database_names.is_empty() {
        return failed_search(reference_id, Diagnostic::new(bib1::DATABASE_NOT_FOUND));
    }
    let query = match cfg.translators.normalize(&req.query) {
        Ok(query) => query,
        Err(diag) => return failed_search(reference_id, diag),
    };
    let name = result_set_name(&req.result_set_name);
    let outcome = match session.backend.as_deref_mut() {
        Some(backend) => backend.search(&SearchArgs {
            query: &query,
            database_names: &req.database_names,
            result_set_name: name,
            replace: req.replace_indicator,
        }),
        None => return failed_search(reference_id, Diagnostic::new(bib1::PERMANENT_SYSTEM_ERROR)),
    };
    debug!(peer = ?session.peer, query, hits = outcome.hits, "search");
    if let Some(diag) = outcome.diagnostic {
        session.result_sets.remove(name);
        return failed_search(reference_id, diag);
    }
    if outcome.hits < 0 {
        session.result_sets.remove(name);
        return failed_search(reference_id, Diagnostic::new(bib1::TEMPORARY_SYSTEM_ERROR));
    }
    let hits = outcome.hits;
    session.result_sets.insert(name.to_owned(), hits);

    let hits_u32 = u32::try_from(hits).unwrap_or(u32::MAX);
    let (count, element_set) = if hits_u32 <= req.small_set_upper_bound {
        (hits_u32, req.small_set_element_set.as_deref())
    } else if hits_u32 < req.large_set_lower_bound {
        (
            req.medium_set_present_number.min(hits_u32),
            req.medium_set_element_set.as_deref(),
        )
    } else {
        (0, None)
    };
    let mut response = SearchResponse {
        reference_id,
        result_count: hits,
        number_of_records_returned: 0,
        next_result_set_position: u32::from(hits > 0),
        search_status: true,
        present_status: None,
        records: None,
    };
    if count == 0 {
        return response;
    }
    let pack_req = pack_request(
        session,
        name,
        1,
        count,
        req.preferred_record_syntax.as_deref(),
        element_set,
        None,
    );
    let Some(backend) = session.backend.as_deref_mut() else {
        return response;
    };
    match packer::pack(backend, &pack_req) {
        Ok(packed) => {
            note_presented(session, 1, &packed);
            response.number_of_records_returned = packed.count_returned;
            response.next_result_set_position = packed.next_start_position;
            response.present_status = Some(packed.present_status);
            response.records = Some(Records::ResponseRecords(packed.records));
        }
        Err(diag) => {
            response.present_status = Some(PresentStatus::Failure);
            response.records = Some(Records::NonSurrogateDiagnostic(diag));
        }
    }
    response
}

fn failed_present(reference_id: ReferenceId, diagnostic: Diagnostic) -> PresentResponse {
    PresentResponse {
        reference_id,
        number_of_records_returned: 0,
        next_result_set_position: 0,
        present_status: PresentStatus::Failure,
        records: Some(Records::NonSurrogateDiagnostic(diagnostic)),
    }
}

pub(super) fn present(session: &mut Session, req: &PresentRequest) -> PresentResponse {
    let reference_id = req.reference_id.clone();
    let name = result_set_name(&req.result_set_id);
    let Some(hits) = session.result_set(name) else {
        return failed_present(
            reference_id,
            Diagnostic::with_addinfo(bib1::RESULT_SET_NOT_FOUND, name),
        );
    };
    let start = i64::from(req.start_point);
    if start < 1 || start > hits {
        return failed_present(
            reference_id,
            Diagnostic::with_addinfo(bib1::PRESENT_OUT_OF_RANGE, req.start_point.to_string()),
        );
    }
    let remaining = u32::try_from(hits - start + 1).unwrap_or(u32::MAX);
    let count = req.number_of_records.min(remaining);
    if count == 0 {
        return PresentResponse {
            reference_id,
            number_of_records_returned: 0,
            next_result_set_position: req.start_point,
            present_status: PresentStatus::Success,
            records: Some(Records::ResponseRecords(Vec::new())),
        };
    }
    let pack_req = pack_request(
        session,
        name,
        req.start_point,
        count,
        req.preferred_record_syntax.as_deref(),
        req.element_set_name.as_deref(),
        req.schema.as_deref(),
    );
    let Some(backend) = session.backend.as_deref_mut() else {
        return failed_present(reference_id, Diagnostic::new(bib1::PERMANENT_SYSTEM_ERROR));
    };
    if let Some(diag) = backend.present(&PresentArgs {
        result_set_name: name,
        start: req.start_point,
        count,
        element_set: pack_req.element_set,
        record_syntax: pack_req.record_syntax,
    }) {
        return failed_present(reference_id, diag);
    }
    match packer::pack(backend, &pack_req) {
        Ok(packed) => {
            note_presented(session, req.start_point, &packed);
            PresentResponse {
                reference_id,
                number_of_records_returned: packed.count_returned,
                next_result_set_position: packed.next_start_position,
                present_status: packed.present_status,
                records: Some(Records::ResponseRecords(packed.records)),
            }
        }
        Err(diag) => failed_present(reference_id, diag),
    }
}

fn failed_scan(req: &ScanRequest, diagnostic: Diagnostic) -> ScanResponse {
    ScanResponse {
        reference_id: req.reference_id.clone(),
        step_size: req.step_size,
        scan_status: ScanStatus::Failure,
        number_of_entries: 0,
        position_of_term: 0,
        entries: Vec::new(),
        diagnostic: Some(diagnostic),
    }
}

pub(super) fn scan(cfg: &EngineConfig, session: &mut Session, req: &ScanRequest) -> ScanResponse {
    if !session.options.allows_scan() {
        return failed_scan(req, Diagnostic::service_not_supported("scan"));
    }
    if req.database_names.is_empty() {
        return failed_scan(req, Diagnostic::new(bib1::DATABASE_NOT_FOUND));
    }
    let term = match cfg.translators.normalize(&req.term) {
        Ok(term) => term,
        Err(diag) => return failed_scan(req, diag),
    };
    let Some(backend) = session.backend.as_deref_mut() else {
        return failed_scan(req, Diagnostic::new(bib1::PERMANENT_SYSTEM_ERROR));
    };
    let outcome = backend.scan(&ScanArgs {
        database_names: &req.database_names,
        term: &term,
        step_size: req.step_size,
        number_of_terms: req.number_of_terms.min(protocol::MAX_SCAN_TERMS),
        preferred_position: req.preferred_position.max(1),
    });
    ScanResponse {
        reference_id: req.reference_id.clone(),
        step_size: req.step_size,
        scan_status: outcome.status,
        number_of_entries: u32::try_from(outcome.entries.len()).unwrap_or(u32::MAX),
        position_of_term: outcome.position_of_term,
        entries: outcome.entries,
        diagnostic: outcome.diagnostic,
    }
}

pub(super) fn sort(session: &mut Session, req: &SortRequest) -> SortResponse {
    let reference_id = req.reference_id.clone();
    let failed = |diagnostic: Diagnostic| SortResponse {
        reference_id: req.reference_id.clone(),
        status: SortStatus::Failure,
        diagnostics: vec![diagnostic],
    };
    if !session.options.allows_sort() {
        return failed(Diagnostic::service_not_supported("sort"));
    }
    let Some(backend) = session.backend.as_deref_mut() else {
        return failed(Diagnostic::new(bib1::PERMANENT_SYSTEM_ERROR));
    };
    let outcome = backend.sort(&SortArgs {
        input_result_sets: &req.input_result_sets,
        sorted_result_set: result_set_name(&req.sorted_result_set),
        keys: &req.sort_keys,
    });
    if let Some(hits) = outcome.hits {
        session
            .result_sets
            .insert(result_set_name(&req.sorted_result_set).to_owned(), hits);
    }
    SortResponse {
        reference_id,
        status: outcome.status,
        diagnostics: outcome.diagnostic.into_iter().collect(),
    }
}

pub(super) fn delete(session: &mut Session, req: &DeleteResultSetRequest) -> DeleteResultSetResponse {
    let reference_id = req.reference_id.clone();
    if !session.options.contains(Options::DELETE_SET) {
        return DeleteResultSetResponse {
            reference_id,
            status: DeleteStatus::SystemProblemAtTarget,
            list_statuses: Vec::new(),
            diagnostic: Some(Diagnostic::service_not_supported("delete")),
        };
    }
    let Some(backend) = session.backend.as_deref_mut() else {
        return DeleteResultSetResponse {
            reference_id,
            status: DeleteStatus::SystemProblemAtTarget,
            list_statuses: Vec::new(),
            diagnostic: Some(Diagnostic::new(bib1::PERMANENT_SYSTEM_ERROR)),
        };
    };
    let outcome = backend.delete(&DeleteArgs {
        all: req.delete_all,
        names: &req.result_sets,
    });
    if req.delete_all && outcome.diagnostic.is_none() {
        session.result_sets.clear();
    } else {
        for (name, status) in &outcome.list {
            if *status == DeleteStatus::Success {
                session.result_sets.remove(name);
            }
        }
    }
    DeleteResultSetResponse {
        reference_id,
        status: outcome.status,
        list_statuses: outcome.list,
        diagnostic: outcome.diagnostic,
    }
}

pub(super) fn extended_services(
    session: &mut Session,
    req: &ExtendedServicesRequest,
) -> ExtendedServicesResponse {
    let failed = |diagnostic: Diagnostic| ExtendedServicesResponse {
        reference_id: req.reference_id.clone(),
        operation_status: EsStatus::Failure,
        diagnostics: vec![diagnostic],
        task_package: None,
    };
    if !session.options.contains(Options::EXTENDED_SERVICES) {
        return failed(Diagnostic::service_not_supported("extended services"));
    }
    let Some(backend) = session.backend.as_deref_mut() else {
        return failed(Diagnostic::new(bib1::PERMANENT_SYSTEM_ERROR));
    };
    let outcome = backend.extended_service(&EsArgs {
        function: req.function,
        package_type: &req.package_type,
        package_name: req.package_name.as_deref(),
        task_specific: &req.task_specific,
    });
    ExtendedServicesResponse {
        reference_id: req.reference_id.clone(),
        operation_status: outcome.status,
        diagnostics: outcome.diagnostic.into_iter().collect(),
        task_package: outcome.task_package,
    }
}

pub(super) fn close(session: &mut Session, req: &Close) -> Outcome {
    if !session.supports_close() {
        return Outcome::ProtocolError("close before version 3");
    }
    info!(peer = ?session.peer, reason = ?req.reason, "peer closed session");
    session.close_backend();
    let mut reply = Close::new(CloseReason::Finished);
    reply.reference_id.clone_from(&req.reference_id);
    Outcome::Closing(Apdu::Close(reply))
}
