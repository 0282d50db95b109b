//! Size-bounded record packing for Present and piggybacked Search results.
//!
//! [`pack`] fetches records one position at a time and decides for each one
//! whether to include it, defer it to the next call, or replace it with a
//! surrogate diagnostic. The running total of encoded entries never exceeds
//! the byte budget, except that the first entry of a call is always kept so
//! that repeated calls make progress.
//!
//! When a record does not fit, deferring it takes priority over diagnosing
//! it: a record that is individually within budget is left for the next call,
//! where it will be the first entry. Only records that can never fit are
//! diagnosed (bib-1 17 above the maximum record size, bib-1 16 when several
//! records were requested).

use tracing::{debug, trace};

use crate::{
    apdu::{
        Diagnostic,
        ExternalRecord,
        NamePlusRecord,
        PresentStatus,
        RecordEntry,
        diagnostic::bib1,
    },
    backend::{Backend, FetchArgs, FetchedRecord},
    codec,
};

/// What to pack.
#[derive(Clone, Copy, Debug)]
pub struct PackRequest<'a> {
    /// Result set to read from.
    pub result_set_name: &'a str,
    /// First position (1-based).
    pub start: u32,
    /// Number of positions wanted.
    pub count: u32,
    /// Preferred message size: bound on the summed size of packed entries.
    pub byte_budget: usize,
    /// Exceptional record size: records above it are never returned.
    pub maximum_record_size: usize,
    /// Requested record syntax.
    pub record_syntax: Option<&'a str>,
    /// Requested element set.
    pub element_set: Option<&'a str>,
    /// Requested schema.
    pub schema: Option<&'a str>,
}

/// A packed batch of records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedResponse {
    /// Records and surrogate diagnostics, one per position.
    pub records: Vec<NamePlusRecord>,
    /// Number of entries in `records`.
    pub count_returned: u32,
    /// Position to continue from, or 0 when the set is exhausted.
    pub next_start_position: u32,
    /// Present status of the batch.
    pub present_status: PresentStatus,
}

fn measure(entry: &NamePlusRecord) -> Result<usize, Diagnostic> {
    codec::encoded_len(entry)
        .map_err(|e| Diagnostic::with_addinfo(bib1::PRESENT_SYSTEM_ERROR, e.to_string()))
}

fn retrieval(record: FetchedRecord) -> NamePlusRecord {
    NamePlusRecord {
        database_name: record.database_name,
        record: RecordEntry::Retrieval(ExternalRecord {
            syntax: record.syntax,
            bytes: record.bytes,
        }),
    }
}

fn surrogate(database_name: Option<String>, diagnostic: Diagnostic) -> NamePlusRecord {
    NamePlusRecord {
        database_name,
        record: RecordEntry::SurrogateDiagnostic(diagnostic),
    }
}

/// Pack records from a result set into a size-bounded batch.
///
/// # Errors
/// Returns the non-surrogate diagnostic reported by the backend, or a system
/// error if an entry cannot be measured. No partial batch is returned.
pub fn pack<B: Backend + ?Sized>(
    backend: &mut B,
    req: &PackRequest<'_>,
) -> Result<PackedResponse, Diagnostic> {
    let wanted = usize::try_from(req.count).unwrap_or(usize::MAX);
    let mut records: Vec<NamePlusRecord> = Vec::new();
    let mut total = 0usize;
    let mut recno = req.start;
    let mut next_start_position = None;
    let mut present_status = PresentStatus::Success;

    while records.len() < wanted {
        let fetched = backend.fetch(&FetchArgs {
            result_set_name: req.result_set_name,
            position: recno,
            record_syntax: req.record_syntax,
            element_set: req.element_set,
            schema: req.schema,
        });
        let last_in_set = fetched.last_in_set;

        let entry = if let Some(diagnostic) = fetched.diagnostic {
            if !fetched.surrogate {
                debug!(recno, %diagnostic, "fetch failed");
                return Err(diagnostic);
            }
            surrogate(None, diagnostic)
        } else if let Some(record) = fetched.record {
            let database_name = record.database_name.clone();
            let candidate = retrieval(record);
            let record_len = measure(&candidate)?;
            if total.saturating_add(record_len) <= req.byte_budget {
                candidate
            } else if !records.is_empty() && record_len <= req.byte_budget {
                debug!(recno, record_len, total, budget = req.byte_budget, "message size reached");
                present_status = PresentStatus::PartialMessageSize;
                next_start_position = Some(recno);
                break;
            } else if record_len > req.maximum_record_size {
                trace!(recno, record_len, max = req.maximum_record_size, "record exceeds maximum size");
                surrogate(
                    database_name,
                    Diagnostic::new(bib1::RECORD_EXCEEDS_MAXIMUM_SIZE),
                )
            } else if req.count > 1 {
                trace!(recno, record_len, "record exceeds preferred message size");
                surrogate(
                    database_name,
                    Diagnostic::new(bib1::RECORD_EXCEEDS_PREFERRED_SIZE),
                )
            } else {
                candidate
            }
        } else {
            debug!(recno, "end of result set");
            present_status = PresentStatus::PartialEndOfSet;
            next_start_position = Some(0);
            break;
        };

        let len = measure(&entry)?;
        if !records.is_empty() && total.saturating_add(len) > req.byte_budget {
            debug!(recno, len, total, "no room for surrogate diagnostic");
            present_status = PresentStatus::PartialMessageSize;
            next_start_position = Some(recno);
            break;
        }
        trace!(recno, len, "packed");
        total = total.saturating_add(len);
        records.push(entry);
        if last_in_set {
            next_start_position = Some(0);
            break;
        }
        recno = recno.saturating_add(1);
    }

    Ok(PackedResponse {
        count_returned: u32::try_from(records.len()).unwrap_or(u32::MAX),
        records,
        next_start_position: next_start_position.unwrap_or(recno),
        present_status,
    })
}
