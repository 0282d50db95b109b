//! In-memory reference backend over a JSON dataset.
//!
//! The dataset maps database names to arrays of JSON records:
//!
//! ```json
//! { "Default": [ { "title": "Tide tables", "author": "Ames", "year": 1998 } ] }
//! ```
//!
//! Queries use the normalized prefix form: `@and`, `@or` and `@not` take two
//! operands, `@attr 1=<use> <operand>` restricts a subtree to one field and
//! `@attrset <name>` is accepted and ignored. A term matches a record when the
//! selected field (or any field) contains it, ignoring case. Use attributes
//! `4`, `1003`, `31` and `1016` map to `title`, `author`, `year` and any field;
//! any other value names a JSON key directly.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
    fs,
    path::Path,
    sync::Arc,
};

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use super::{
    Backend,
    BackendFactory,
    DeleteArgs,
    DeleteOutcome,
    FetchArgs,
    FetchOutcome,
    FetchedRecord,
    InitInfo,
    ScanArgs,
    ScanOutcome,
    SearchArgs,
    SearchOutcome,
    SortArgs,
    SortOutcome,
};
use crate::{
    apdu::{DeleteStatus, Diagnostic, ScanStatus, SortKey, SortStatus, TermInfo, diagnostic::bib1},
    options::Options,
};

/// Record syntax produced by this backend.
pub const JSON_SYNTAX: &str = "json";

/// Errors raised while loading a dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The file could not be read.
    #[error("failed to read dataset {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid dataset.
    #[error("invalid dataset: {0}")]
    Json(#[from] serde_json::Error),
}

/// Named databases of JSON records.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    databases: BTreeMap<String, Vec<Value>>,
}

impl Dataset {
    /// Load a dataset from a JSON file.
    ///
    /// # Errors
    /// Returns [`DatasetError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, DatasetError> {
        let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Small built-in dataset with a single `Default` database.
    #[must_use]
    pub fn sample() -> Self {
        let records = json!([
            { "title": "Tide tables of the northern coast", "author": "Ames", "year": 1998 },
            { "title": "Fishing the estuary", "author": "Brody", "year": 2004 },
            { "title": "A history of lighthouses", "author": "Carver", "year": 1987 },
            { "title": "Salt water chemistry", "author": "Ames", "year": 2011 },
            { "title": "Harbour pilots and their craft", "author": "Dunmore", "year": 1975 },
            { "title": "Fresh water ecology", "author": "Ellery", "year": 2016 },
        ]);
        let mut databases = BTreeMap::new();
        if let Value::Array(items) = records {
            databases.insert("Default".to_owned(), items);
        }
        Self { databases }
    }

    /// Names of the databases in the dataset.
    pub fn database_names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    fn records(&self, database: &str) -> Option<&[Value]> {
        self.databases.get(database).map(Vec::as_slice)
    }

    fn record(&self, hit: &Hit) -> Option<&Value> {
        self.records(&hit.database)?.get(hit.index)
    }
}

/// Factory handing out [`MemoryBackend`] sessions over one shared dataset.
#[derive(Clone, Debug)]
pub struct MemoryBackendFactory {
    dataset: Arc<Dataset>,
}

impl MemoryBackendFactory {
    /// Serve `dataset`.
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset: Arc::new(dataset),
        }
    }
}

impl BackendFactory for MemoryBackendFactory {
    fn init(&self, info: &InitInfo) -> Result<Box<dyn Backend>, Diagnostic> {
        debug!(peer = ?info.peer, client = ?info.implementation_name, "memory backend session");
        Ok(Box::new(MemoryBackend::new(Arc::clone(&self.dataset))))
    }

    fn capabilities(&self) -> Options {
        Options::BASELINE | Options::SCAN | Options::SORT | Options::DELETE_SET
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Hit {
    database: String,
    index: usize,
}

/// One session over an in-memory dataset.
#[derive(Debug)]
pub struct MemoryBackend {
    dataset: Arc<Dataset>,
    sets: HashMap<String, Vec<Hit>>,
}

impl MemoryBackend {
    /// Start a session over `dataset`.
    #[must_use]
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self {
            dataset,
            sets: HashMap::new(),
        }
    }

    fn check_databases(&self, names: &[String]) -> Result<(), Diagnostic> {
        match names.iter().find(|name| self.dataset.records(name).is_none()) {
            Some(missing) => Err(Diagnostic::with_addinfo(
                bib1::DATABASE_NOT_FOUND,
                missing.as_str(),
            )),
            None => Ok(()),
        }
    }

    fn run_search(&self, args: &SearchArgs<'_>) -> Result<Vec<Hit>, Diagnostic> {
        self.check_databases(args.database_names)?;
        if !args.replace && self.sets.contains_key(args.result_set_name) {
            return Err(Diagnostic::with_addinfo(
                bib1::RESULT_SET_EXISTS,
                args.result_set_name,
            ));
        }
        let node = parse(args.query)?;
        let mut hits = Vec::new();
        for database in args.database_names {
            let records = self.dataset.records(database).unwrap_or_default();
            for (index, record) in records.iter().enumerate() {
                if node.matches(record) {
                    hits.push(Hit {
                        database: database.clone(),
                        index,
                    });
                }
            }
        }
        Ok(hits)
    }

    fn run_scan(&self, args: &ScanArgs<'_>) -> Result<ScanOutcome, Diagnostic> {
        self.check_databases(args.database_names)?;
        let Node::Term { field, text } = parse(args.term)? else {
            return Err(Diagnostic::with_addinfo(
                bib1::MALFORMED_QUERY,
                "scan needs a single term",
            ));
        };
        let mut index: BTreeMap<String, u64> = BTreeMap::new();
        for database in args.database_names {
            for record in self.dataset.records(database).unwrap_or_default() {
                let mut words = BTreeSet::new();
                for value in field_texts(record, field.as_deref()) {
                    words.extend(split_words(&value));
                }
                for word in words {
                    *index.entry(word).or_default() += 1;
                }
            }
        }
        let terms: Vec<(String, u64)> = index.into_iter().collect();
        let start = terms.partition_point(|(term, _)| term.as_str() < text.as_str());
        let before = usize::try_from(args.preferred_position.saturating_sub(1)).unwrap_or(0);
        let begin = start.saturating_sub(before);
        let wanted = usize::try_from(args.number_of_terms).unwrap_or(usize::MAX);
        let entries: Vec<TermInfo> = terms
            .into_iter()
            .skip(begin)
            .take(wanted)
            .map(|(term, occurrences)| TermInfo {
                term,
                occurrences,
                display_term: None,
            })
            .collect();
        let status = if entries.len() == wanted {
            ScanStatus::Success
        } else {
            ScanStatus::Partial
        };
        Ok(ScanOutcome {
            status,
            position_of_term: u32::try_from(start - begin + 1).unwrap_or(u32::MAX),
            entries,
            diagnostic: None,
        })
    }

    fn sort_key(&self, hit: &Hit, field: &str) -> Option<String> {
        let record = self.dataset.record(hit)?;
        record.get(field).map(|v| value_text(v).to_lowercase())
    }

    fn compare(&self, a: &Hit, b: &Hit, keys: &[SortKey]) -> Ordering {
        for key in keys {
            let ord = match (self.sort_key(a, &key.field), self.sort_key(b, &key.field)) {
                (Some(x), Some(y)) => {
                    if key.ascending {
                        x.cmp(&y)
                    } else {
                        y.cmp(&x)
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl Backend for MemoryBackend {
    fn search(&mut self, args: &SearchArgs<'_>) -> SearchOutcome {
        match self.run_search(args) {
            Ok(hits) => {
                let count = i64::try_from(hits.len()).unwrap_or(i64::MAX);
                self.sets.insert(args.result_set_name.to_owned(), hits);
                SearchOutcome::hits(count)
            }
            Err(diagnostic) => SearchOutcome::failed(diagnostic),
        }
    }

    fn fetch(&mut self, args: &FetchArgs<'_>) -> FetchOutcome {
        let Some(set) = self.sets.get(args.result_set_name) else {
            return FetchOutcome::fatal(Diagnostic::with_addinfo(
                bib1::RESULT_SET_NOT_FOUND,
                args.result_set_name,
            ));
        };
        let Some(position) = usize::try_from(args.position).ok().filter(|p| *p >= 1) else {
            return FetchOutcome::end_of_set();
        };
        let Some(hit) = set.get(position - 1) else {
            return FetchOutcome::end_of_set();
        };
        let last_in_set = position == set.len();
        if let Some(syntax) = args.record_syntax.filter(|s| !s.eq_ignore_ascii_case(JSON_SYNTAX)) {
            return FetchOutcome::surrogate(
                Diagnostic::with_addinfo(bib1::RECORD_SYNTAX_UNSUPPORTED, syntax),
                last_in_set,
            );
        }
        let Some(record) = self.dataset.record(hit) else {
            return FetchOutcome::surrogate(
                Diagnostic::new(bib1::PRESENT_SYSTEM_ERROR),
                last_in_set,
            );
        };
        let view = match args.element_set {
            Some(name) if name.eq_ignore_ascii_case("B") => brief(record),
            _ => record.clone(),
        };
        match serde_json::to_vec(&view) {
            Ok(bytes) => FetchOutcome::record(
                FetchedRecord {
                    database_name: Some(hit.database.clone()),
                    syntax: JSON_SYNTAX.to_owned(),
                    bytes,
                },
                last_in_set,
            ),
            Err(e) => FetchOutcome::surrogate(
                Diagnostic::with_addinfo(bib1::PRESENT_SYSTEM_ERROR, e.to_string()),
                last_in_set,
            ),
        }
    }

    fn scan(&mut self, args: &ScanArgs<'_>) -> ScanOutcome {
        self.run_scan(args).unwrap_or_else(ScanOutcome::failed)
    }

    fn sort(&mut self, args: &SortArgs<'_>) -> SortOutcome {
        let mut merged = Vec::new();
        for name in args.input_result_sets {
            let Some(set) = self.sets.get(name) else {
                return SortOutcome::failed(Diagnostic::with_addinfo(
                    bib1::RESULT_SET_NOT_FOUND,
                    name.as_str(),
                ));
            };
            merged.extend(set.iter().cloned());
        }
        merged.sort_by(|a, b| self.compare(a, b, args.keys));
        let hits = i64::try_from(merged.len()).unwrap_or(i64::MAX);
        self.sets.insert(args.sorted_result_set.to_owned(), merged);
        SortOutcome {
            status: SortStatus::Success,
            hits: Some(hits),
            diagnostic: None,
        }
    }

    fn delete(&mut self, args: &DeleteArgs<'_>) -> DeleteOutcome {
        if args.all {
            let list = self
                .sets
                .drain()
                .map(|(name, _)| (name, DeleteStatus::Success))
                .collect();
            return DeleteOutcome {
                status: DeleteStatus::Success,
                list,
                diagnostic: None,
            };
        }
        let list: Vec<(String, DeleteStatus)> = args
            .names
            .iter()
            .map(|name| {
                let status = if self.sets.remove(name).is_some() {
                    DeleteStatus::Success
                } else {
                    DeleteStatus::ResultSetDidNotExist
                };
                (name.clone(), status)
            })
            .collect();
        let status = list
            .iter()
            .map(|(_, status)| *status)
            .find(|status| *status != DeleteStatus::Success)
            .unwrap_or(DeleteStatus::Success);
        DeleteOutcome {
            status,
            list,
            diagnostic: None,
        }
    }

    fn close(&mut self) { self.sets.clear(); }
}

/// Parsed prefix query.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Node {
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>, Box<Node>),
    Term { field: Option<String>, text: String },
}

impl Node {
    fn matches(&self, record: &Value) -> bool {
        match self {
            Self::And(a, b) => a.matches(record) && b.matches(record),
            Self::Or(a, b) => a.matches(record) || b.matches(record),
            Self::Not(a, b) => a.matches(record) && !b.matches(record),
            Self::Term { field, text } => field_texts(record, field.as_deref())
                .iter()
                .any(|value| value.to_lowercase().contains(text.as_str())),
        }
    }
}

fn malformed(detail: impl Into<String>) -> Diagnostic {
    Diagnostic::with_addinfo(bib1::MALFORMED_QUERY, detail)
}

fn tokenize(query: &str) -> Result<Vec<String>, Diagnostic> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => token.push(ch),
                    None => return Err(malformed("unterminated quote")),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}

fn use_attribute(value: &str) -> Option<String> {
    match value {
        "4" => Some("title".to_owned()),
        "1003" => Some("author".to_owned()),
        "31" => Some("year".to_owned()),
        "1016" => None,
        other => Some(other.to_owned()),
    }
}

fn parse_node<I>(tokens: &mut I, field: Option<String>) -> Result<Node, Diagnostic>
where
    I: Iterator<Item = String>,
{
    let token = tokens
        .next()
        .ok_or_else(|| malformed("unexpected end of query"))?;
    match token.as_str() {
        "@and" | "@or" | "@not" => {
            let left = Box::new(parse_node(tokens, field.clone())?);
            let right = Box::new(parse_node(tokens, field)?);
            Ok(match token.as_str() {
                "@and" => Node::And(left, right),
                "@or" => Node::Or(left, right),
                _ => Node::Not(left, right),
            })
        }
        "@attr" => {
            let mut attribute = tokens
                .next()
                .ok_or_else(|| malformed("missing attribute"))?;
            if !attribute.contains('=') {
                attribute = tokens
                    .next()
                    .ok_or_else(|| malformed("missing attribute"))?;
            }
            let (kind, value) = attribute
                .split_once('=')
                .ok_or_else(|| malformed(format!("bad attribute {attribute}")))?;
            let target = if kind == "1" {
                use_attribute(value)
            } else {
                field
            };
            parse_node(tokens, target)
        }
        "@attrset" => {
            tokens
                .next()
                .ok_or_else(|| malformed("missing attribute set"))?;
            parse_node(tokens, field)
        }
        op if op.starts_with('@') => Err(malformed(format!("unknown operator {op}"))),
        _ => Ok(Node::Term {
            field,
            text: token.to_lowercase(),
        }),
    }
}

fn parse(query: &str) -> Result<Node, Diagnostic> {
    let mut tokens = tokenize(query)?.into_iter();
    let node = parse_node(&mut tokens, None)?;
    if let Some(extra) = tokens.next() {
        return Err(malformed(format!("unexpected {extra}")));
    }
    Ok(node)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(" "),
        Value::Object(map) => map.values().map(value_text).collect::<Vec<_>>().join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn field_texts(record: &Value, field: Option<&str>) -> Vec<String> {
    match field {
        Some(name) => record.get(name).map(value_text).into_iter().collect(),
        None => vec![value_text(record)],
    }
}

fn split_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

fn brief(record: &Value) -> Value {
    match record.get("title") {
        Some(title) => json!({ "title": title }),
        None => record.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn backend() -> MemoryBackend { MemoryBackend::new(Arc::new(Dataset::sample())) }

    fn default_db() -> Vec<String> { vec!["Default".to_owned()] }

    fn search(backend: &mut MemoryBackend, query: &str) -> SearchOutcome {
        let dbs = default_db();
        backend.search(&SearchArgs {
            query,
            database_names: &dbs,
            result_set_name: "default",
            replace: true,
        })
    }

    fn fetch(backend: &mut MemoryBackend, position: u32) -> FetchOutcome {
        backend.fetch(&FetchArgs {
            result_set_name: "default",
            position,
            record_syntax: None,
            element_set: None,
            schema: None,
        })
    }

    #[rstest]
    #[case("water", 2)]
    #[case("WATER", 2)]
    #[case("@attr 1=4 water", 2)]
    #[case("@attr 1=1003 ames", 2)]
    #[case("@attr bib-1 1=1003 ames", 2)]
    #[case("@and water fresh", 1)]
    #[case("@or lighthouses estuary", 2)]
    #[case("@not @attr 1=1003 ames tide", 1)]
    #[case("@attrset bib-1 @attr 1=31 1987", 1)]
    #[case("\"salt water\"", 1)]
    #[case("zebra", 0)]
    fn counts_hits(mut backend: MemoryBackend, #[case] query: &str, #[case] expected: i64) {
        assert_eq!(search(&mut backend, query), SearchOutcome::hits(expected));
    }

    #[rstest]
    #[case("@and water")]
    #[case("@frob water")]
    #[case("water fish")]
    #[case("\"open")]
    #[case("")]
    fn rejects_malformed_queries(mut backend: MemoryBackend, #[case] query: &str) {
        let outcome = search(&mut backend, query);
        assert_eq!(
            outcome.diagnostic.map(|d| d.code),
            Some(bib1::MALFORMED_QUERY)
        );
    }

    #[rstest]
    fn unknown_database_is_diagnosed(mut backend: MemoryBackend) {
        let dbs = vec!["Nope".to_owned()];
        let outcome = backend.search(&SearchArgs {
            query: "water",
            database_names: &dbs,
            result_set_name: "default",
            replace: true,
        });
        assert_eq!(
            outcome.diagnostic,
            Some(Diagnostic::with_addinfo(bib1::DATABASE_NOT_FOUND, "Nope"))
        );
    }

    #[rstest]
    fn replace_indicator_protects_existing_sets(mut backend: MemoryBackend) {
        search(&mut backend, "water");
        let dbs = default_db();
        let outcome = backend.search(&SearchArgs {
            query: "fish",
            database_names: &dbs,
            result_set_name: "default",
            replace: false,
        });
        assert_eq!(
            outcome.diagnostic.map(|d| d.code),
            Some(bib1::RESULT_SET_EXISTS)
        );
    }

    #[rstest]
    fn fetch_walks_the_result_set(mut backend: MemoryBackend) {
        search(&mut backend, "water");
        let first = fetch(&mut backend, 1);
        assert!(!first.last_in_set);
        let record = first.record.expect("record");
        assert_eq!(record.syntax, JSON_SYNTAX);
        assert_eq!(record.database_name.as_deref(), Some("Default"));
        let value: Value = serde_json::from_slice(&record.bytes).expect("json");
        assert_eq!(value["author"], "Ames");

        assert!(fetch(&mut backend, 2).last_in_set);
        assert_eq!(fetch(&mut backend, 3), FetchOutcome::end_of_set());
    }

    #[rstest]
    fn fetch_from_missing_set_is_fatal(mut backend: MemoryBackend) {
        let outcome = fetch(&mut backend, 1);
        assert!(!outcome.surrogate);
        assert_eq!(
            outcome.diagnostic.map(|d| d.code),
            Some(bib1::RESULT_SET_NOT_FOUND)
        );
    }

    #[rstest]
    fn unsupported_syntax_is_surrogate(mut backend: MemoryBackend) {
        search(&mut backend, "water");
        let outcome = backend.fetch(&FetchArgs {
            result_set_name: "default",
            position: 1,
            record_syntax: Some("usmarc"),
            element_set: None,
            schema: None,
        });
        assert!(outcome.surrogate);
        assert_eq!(
            outcome.diagnostic.map(|d| d.code),
            Some(bib1::RECORD_SYNTAX_UNSUPPORTED)
        );
    }

    #[rstest]
    fn brief_element_set_keeps_title(mut backend: MemoryBackend) {
        search(&mut backend, "lighthouses");
        let outcome = backend.fetch(&FetchArgs {
            result_set_name: "default",
            position: 1,
            record_syntax: Some("JSON"),
            element_set: Some("B"),
            schema: None,
        });
        let bytes = outcome.record.expect("record").bytes;
        let value: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value, json!({ "title": "A history of lighthouses" }));
    }

    #[rstest]
    #[case("water", 1, 3, vec!["water"], 1)]
    #[case("tide", 3, 3, vec!["the", "their", "tide"], 3)]
    #[case("@attr 1=1003 b", 2, 3, vec!["ames", "brody", "carver"], 2)]
    #[case("@attr 1=1003 ames", 1, 10, vec!["ames", "brody", "carver", "dunmore", "ellery"], 1)]
    fn scans_terms(
        mut backend: MemoryBackend,
        #[case] term: &str,
        #[case] preferred_position: u32,
        #[case] number_of_terms: u32,
        #[case] expected: Vec<&str>,
        #[case] position_of_term: u32,
    ) {
        let dbs = default_db();
        let outcome = backend.scan(&ScanArgs {
            database_names: &dbs,
            term,
            step_size: 0,
            number_of_terms,
            preferred_position,
        });
        let terms: Vec<&str> = outcome.entries.iter().map(|e| e.term.as_str()).collect();
        assert_eq!(terms, expected);
        assert_eq!(outcome.position_of_term, position_of_term);
        let expected_status = if expected.len() == number_of_terms as usize {
            ScanStatus::Success
        } else {
            ScanStatus::Partial
        };
        assert_eq!(outcome.status, expected_status);
    }

    #[rstest]
    fn scan_counts_records_not_occurrences(mut backend: MemoryBackend) {
        let dbs = default_db();
        let outcome = backend.scan(&ScanArgs {
            database_names: &dbs,
            term: "@attr 1=1003 ames",
            step_size: 0,
            number_of_terms: 1,
            preferred_position: 1,
        });
        assert_eq!(outcome.entries.first().map(|e| e.occurrences), Some(2));
    }

    #[rstest]
    fn sorts_into_new_set(mut backend: MemoryBackend) {
        search(&mut backend, "water");
        let inputs = vec!["default".to_owned()];
        let keys = vec![SortKey {
            field: "year".to_owned(),
            ascending: false,
        }];
        let outcome = backend.sort(&SortArgs {
            input_result_sets: &inputs,
            sorted_result_set: "sorted",
            keys: &keys,
        });
        assert_eq!(outcome.status, SortStatus::Success);
        assert_eq!(outcome.hits, Some(2));
        let first = backend.fetch(&FetchArgs {
            result_set_name: "sorted",
            position: 1,
            record_syntax: None,
            element_set: None,
            schema: None,
        });
        let value: Value =
            serde_json::from_slice(&first.record.expect("record").bytes).expect("json");
        assert_eq!(value["year"], 2016);
    }

    #[rstest]
    fn sort_of_missing_set_fails(mut backend: MemoryBackend) {
        let inputs = vec!["ghost".to_owned()];
        let outcome = backend.sort(&SortArgs {
            input_result_sets: &inputs,
            sorted_result_set: "sorted",
            keys: &[],
        });
        assert_eq!(outcome.status, SortStatus::Failure);
    }

    #[rstest]
    fn deletes_named_and_all_sets(mut backend: MemoryBackend) {
        search(&mut backend, "water");
        let names = vec!["default".to_owned(), "ghost".to_owned()];
        let outcome = backend.delete(&DeleteArgs {
            all: false,
            names: &names,
        });
        assert_eq!(outcome.status, DeleteStatus::ResultSetDidNotExist);
        assert_eq!(
            outcome.list,
            vec![
                ("default".to_owned(), DeleteStatus::Success),
                ("ghost".to_owned(), DeleteStatus::ResultSetDidNotExist),
            ]
        );

        search(&mut backend, "fish");
        let all = backend.delete(&DeleteArgs {
            all: true,
            names: &[],
        });
        assert_eq!(all.status, DeleteStatus::Success);
        assert_eq!(all.list.len(), 1);
        assert!(fetch(&mut backend, 1).diagnostic.is_some());
    }

    #[test]
    fn loads_dataset_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"Books": [{{"title": "Rust"}}], "Maps": []}}"#).expect("write");
        let dataset = Dataset::from_file(file.path()).expect("dataset");
        let names: Vec<&str> = dataset.database_names().collect();
        assert_eq!(names, vec!["Books", "Maps"]);
    }

    #[test]
    fn rejects_invalid_dataset_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "[1, 2]").expect("write");
        assert!(matches!(
            Dataset::from_file(file.path()),
            Err(DatasetError::Json(_))
        ));
    }
}
