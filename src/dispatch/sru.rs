//! SRU operations over HTTP.
//!
//! Requests are stateless: each one names its database in the path and its
//! operation in the form parameters. The association's [`Session`] only
//! carries the lazily created backend handle between requests on the same
//! connection. Every answer is an XML document with status 200; protocol
//! problems are reported as SRU diagnostics inside it.

use tracing::debug;

use super::Session;
use crate::{
    apdu::{
        Diagnostic,
        NamePlusRecord,
        Query,
        RecordEntry,
        diagnostic::{bib1, sru, sru_message},
    },
    backend::{ScanArgs, SearchArgs},
    engine::EngineConfig,
    http::{HttpRequest, HttpResponse, xml::escape},
    packer::{self, PackRequest},
    protocol,
};

/// SRU version reported in every response.
pub const SRU_VERSION: &str = "1.2";
/// Database used when the request path is empty.
pub const DEFAULT_DATABASE: &str = "Default";

const DEFAULT_MAXIMUM_RECORDS: u32 = 10;
const DEFAULT_MAXIMUM_TERMS: u32 = 10;
const DIAGNOSTIC_SCHEMA: &str = "info:srw/schema/1/diagnostics-v1.1";

/// An SRU diagnostic as rendered in responses.
#[derive(Clone, Debug, PartialEq, Eq)]
struct SruDiagnostic {
    code: u32,
    details: Option<String>,
}

impl SruDiagnostic {
    fn new(code: u32, details: impl Into<String>) -> Self {
        Self {
            code,
            details: Some(details.into()),
        }
    }
}

impl From<Diagnostic> for SruDiagnostic {
    fn from(diag: Diagnostic) -> Self {
        Self {
            code: diag.sru_code(),
            details: diag.addinfo,
        }
    }
}

type Rendered = (String, Vec<SruDiagnostic>);

fn failed(diag: impl Into<SruDiagnostic>) -> Rendered { (String::new(), vec![diag.into()]) }

/// Answer one HTTP request.
pub fn handle_http(cfg: &EngineConfig, session: &mut Session, req: &HttpRequest) -> HttpResponse {
    let mut response = match req.method.as_str() {
        "GET" | "POST" => respond(cfg, session, req),
        other => {
            debug!(method = other, "unsupported http method");
            HttpResponse::method_not_allowed()
        }
    };
    response.close = !req.keep_alive();
    response
}

fn respond(cfg: &EngineConfig, session: &mut Session, req: &HttpRequest) -> HttpResponse {
    let params = req.params();
    let database = match req.path() {
        "" => DEFAULT_DATABASE,
        path => path,
    };
    let operation = param(&params, "operation").unwrap_or("explain");
    debug!(peer = ?session.peer, operation, database, "sru request");
    let (kind, (inner, diagnostics)) = match operation {
        "searchRetrieve" => (
            "searchRetrieveResponse",
            search_retrieve(cfg, session, database, &params),
        ),
        "scan" => ("scanResponse", scan(cfg, session, database, &params)),
        "explain" => ("explainResponse", (explain(cfg, database), Vec::new())),
        other => (
            "explainResponse",
            failed(SruDiagnostic::new(sru::UNSUPPORTED_OPERATION, other)),
        ),
    };
    HttpResponse::xml(envelope(kind, &inner, &diagnostics))
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn number(params: &[(String, String)], name: &str, default: u32) -> Result<u32, SruDiagnostic> {
    match param(params, name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| SruDiagnostic::new(sru::UNSUPPORTED_PARAMETER_VALUE, name)),
    }
}

fn size(value: u32) -> usize { usize::try_from(value).unwrap_or(usize::MAX) }

fn search_retrieve(
    cfg: &EngineConfig,
    session: &mut Session,
    database: &str,
    params: &[(String, String)],
) -> Rendered {
    let Some(raw) = param(params, "query") else {
        return failed(SruDiagnostic::new(sru::MANDATORY_PARAMETER_MISSING, "query"));
    };
    let (start, maximum) = match (
        number(params, "startRecord", 1),
        number(params, "maximumRecords", DEFAULT_MAXIMUM_RECORDS),
    ) {
        (Ok(start), Ok(maximum)) => (start, maximum),
        (Err(diag), _) | (_, Err(diag)) => return failed(diag),
    };
    let packing = param(params, "recordPacking").unwrap_or("string");
    let query = match cfg.translators.normalize(&Query::Contextual(raw.to_owned())) {
        Ok(query) => query,
        Err(diag) => return failed(diag),
    };
    let backend = match session.ensure_backend(cfg) {
        Ok(backend) => backend,
        Err(diag) => return failed(diag),
    };
    let databases = [database.to_owned()];
    let outcome = backend.search(&SearchArgs {
        query: &query,
        database_names: &databases,
        result_set_name: protocol::DEFAULT_RESULT_SET,
        replace: true,
    });
    if let Some(diag) = outcome.diagnostic {
        return failed(diag);
    }
    if outcome.hits < 0 {
        return failed(Diagnostic::new(bib1::TEMPORARY_SYSTEM_ERROR));
    }
    let hits = outcome.hits;
    let mut inner = format!("<zs:numberOfRecords>{hits}</zs:numberOfRecords>");
    if hits == 0 || maximum == 0 {
        return (inner, Vec::new());
    }
    if start == 0 || i64::from(start) > hits {
        let diag = SruDiagnostic::new(sru::FIRST_RECORD_OUT_OF_RANGE, start.to_string());
        return (inner, vec![diag]);
    }
    let remaining = u32::try_from(hits - i64::from(start) + 1).unwrap_or(u32::MAX);
    let request = PackRequest {
        result_set_name: protocol::DEFAULT_RESULT_SET,
        start,
        count: maximum.min(remaining),
        byte_budget: size(cfg.preferred_message_size),
        maximum_record_size: size(cfg.maximum_record_size),
        record_syntax: None,
        element_set: None,
        schema: param(params, "recordSchema"),
    };
    match packer::pack(backend, &request) {
        Ok(packed) => {
            inner.push_str("<zs:records>");
            for (position, entry) in (start..).zip(&packed.records) {
                render_record(&mut inner, entry, position, packing);
            }
            inner.push_str("</zs:records>");
            if packed.next_start_position != 0 {
                inner.push_str(&format!(
                    "<zs:nextRecordPosition>{}</zs:nextRecordPosition>",
                    packed.next_start_position
                ));
            }
            (inner, Vec::new())
        }
        Err(diag) => (inner, vec![diag.into()]),
    }
}

fn render_record(out: &mut String, entry: &NamePlusRecord, position: u32, packing: &str) {
    let (schema, data) = match &entry.record {
        RecordEntry::Retrieval(record) => (
            escape(&record.syntax).into_owned(),
            escape(&String::from_utf8_lossy(&record.bytes)).into_owned(),
        ),
        RecordEntry::SurrogateDiagnostic(diag) => {
            let mut data = String::new();
            render_diagnostic(&mut data, &SruDiagnostic::from(diag.clone()));
            (DIAGNOSTIC_SCHEMA.to_owned(), data)
        }
    };
    out.push_str(&format!(
        "<zs:record><zs:recordSchema>{schema}</zs:recordSchema>\
         <zs:recordPacking>{}</zs:recordPacking>\
         <zs:recordData>{data}</zs:recordData>\
         <zs:recordPosition>{position}</zs:recordPosition></zs:record>",
        escape(packing)
    ));
}

fn scan(
    cfg: &EngineConfig,
    session: &mut Session,
    database: &str,
    params: &[(String, String)],
) -> Rendered {
    let Some(clause) = param(params, "scanClause") else {
        return failed(SruDiagnostic::new(sru::MANDATORY_PARAMETER_MISSING, "scanClause"));
    };
    let (position, maximum) = match (
        number(params, "responsePosition", 1),
        number(params, "maximumTerms", DEFAULT_MAXIMUM_TERMS),
    ) {
        (Ok(position), Ok(maximum)) => (position, maximum),
        (Err(diag), _) | (_, Err(diag)) => return failed(diag),
    };
    let term = match cfg.translators.normalize(&Query::Contextual(clause.to_owned())) {
        Ok(term) => term,
        Err(diag) => return failed(diag),
    };
    let backend = match session.ensure_backend(cfg) {
        Ok(backend) => backend,
        Err(diag) => return failed(diag),
    };
    let databases = [database.to_owned()];
    let outcome = backend.scan(&ScanArgs {
        database_names: &databases,
        term: &term,
        step_size: 0,
        number_of_terms: maximum.min(protocol::MAX_SCAN_TERMS),
        preferred_position: position.max(1),
    });
    if let Some(diag) = outcome.diagnostic {
        return failed(diag);
    }
    let mut inner = String::from("<zs:terms>");
    for entry in &outcome.entries {
        inner.push_str(&format!(
            "<zs:term><zs:value>{}</zs:value><zs:numberOfRecords>{}</zs:numberOfRecords>",
            escape(&entry.term),
            entry.occurrences
        ));
        if let Some(display) = &entry.display_term {
            inner.push_str(&format!("<zs:displayTerm>{}</zs:displayTerm>", escape(display)));
        }
        inner.push_str("</zs:term>");
    }
    inner.push_str("</zs:terms>");
    (inner, Vec::new())
}

fn explain(cfg: &EngineConfig, database: &str) -> String {
    format!(
        "<zs:record><zs:recordSchema>http://explain.z3950.org/dtd/2.0/</zs:recordSchema>\
         <zs:recordPacking>xml</zs:recordPacking><zs:recordData>\
         <explain xmlns=\"http://explain.z3950.org/dtd/2.0/\">\
         <serverInfo protocol=\"SRU\" version=\"{SRU_VERSION}\"><database>{db}</database></serverInfo>\
         <databaseInfo><title>{db}</title></databaseInfo>\
         <implementationInfo identifier=\"{id}\" version=\"{version}\"><title>{name}</title></implementationInfo>\
         </explain></zs:recordData></zs:record>",
        db = escape(database),
        id = protocol::IMPLEMENTATION_ID,
        version = protocol::IMPLEMENTATION_VERSION,
        name = escape(&cfg.implementation_name),
    )
}

fn render_diagnostic(out: &mut String, diag: &SruDiagnostic) {
    out.push_str(&format!(
        "<diag:diagnostic xmlns:diag=\"http://www.loc.gov/zing/srw/diagnostic/\">\
         <diag:uri>info:srw/diagnostic/1/{}</diag:uri>",
        diag.code
    ));
    if let Some(details) = &diag.details {
        out.push_str(&format!("<diag:details>{}</diag:details>", escape(details)));
    }
    out.push_str(&format!(
        "<diag:message>{}</diag:message></diag:diagnostic>",
        sru_message(diag.code)
    ));
}

fn envelope(kind: &str, inner: &str, diagnostics: &[SruDiagnostic]) -> String {
    let mut out = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <zs:{kind} xmlns:zs=\"http://www.loc.gov/zing/srw/\">\
         <zs:version>{SRU_VERSION}</zs:version>{inner}"
    );
    if !diagnostics.is_empty() {
        out.push_str("<zs:diagnostics>");
        for diag in diagnostics {
            render_diagnostic(&mut out, diag);
        }
        out.push_str("</zs:diagnostics>");
    }
    out.push_str(&format!("</zs:{kind}>"));
    out
}
