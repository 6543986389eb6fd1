//! `expanse list`, `expanse show` and `expanse map`.

use std::fmt::Write as _;

use expanse_cache::{ExpansionFile, RecordInfo, RecordStatus};
use expanse_source::{LineIndex, RangeMap, TextRange};

use crate::project::Project;
use crate::{MapArgs, ReportFormat};

/// Runs `expanse list`.
pub fn list(project: &Project, format: ReportFormat) -> Result<i32, Box<dyn std::error::Error>> {
    let storage = &project.storage;
    let records = storage.records(&storage.read())?;
    print!("{}", render_records(&records, format)?);
    Ok(0)
}

/// Runs `expanse show`.
pub fn show(project: &Project, file: &str) -> Result<i32, Box<dyn std::error::Error>> {
    let (file, map) = load(project, file)?;
    print!("{}", render_pairs(&file, &map));
    Ok(0)
}

/// Runs `expanse map`.
pub fn map(project: &Project, args: &MapArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (_, map) = load(project, &args.file)?;
    let end = args.end.unwrap_or(args.start);
    let range = TextRange::try_new(args.start, end)?;
    let mapped = if args.reverse {
        map.map_source_to_target(range)
    } else {
        map.map_target_to_source(range)
    };
    if mapped.is_empty() {
        eprintln!("{range} does not map to anything");
        return Ok(1);
    }
    let index = match args.text {
        Some(ref path) => Some(LineIndex::new(std::fs::read_to_string(path)?)),
        None => None,
    };
    for r in mapped {
        println!("{}", render_mapped(r, index.as_ref()));
    }
    Ok(0)
}

/// One mapped range, followed by its `line:col` span when the text it falls
/// in is known.
fn render_mapped(range: TextRange, index: Option<&LineIndex>) -> String {
    let Some(index) = index else {
        return range.to_string();
    };
    match index.span(range) {
        Some((start, end)) => format!("{range}  {start}-{end}"),
        None => format!("{range}  (outside the given text)"),
    }
}

/// Loads one record, reporting why it cannot be used.
fn load(project: &Project, name: &str) -> Result<(ExpansionFile, RangeMap), Box<dyn std::error::Error>> {
    let file = ExpansionFile::new(name)?;
    let storage = &project.storage;
    match storage.store().try_read(&storage.read(), &file)? {
        Some(map) => Ok((file, map)),
        None => Err(format!("no expansion record stored for {file}").into()),
    }
}

fn render_records(
    records: &[RecordInfo],
    format: ReportFormat,
) -> Result<String, serde_json::Error> {
    if format == ReportFormat::Json {
        let mut out = serde_json::to_string_pretty(records)?;
        out.push('\n');
        return Ok(out);
    }
    let mut out = String::new();
    for record in records {
        let status = match &record.status {
            RecordStatus::Valid { pairs } => format!("valid, {pairs} pairs"),
            RecordStatus::Outdated { version } => format!("outdated, schema v{version}"),
            RecordStatus::Corrupt { reason } => format!("corrupt: {reason}"),
        };
        let _ = writeln!(out, "{}  {status}", record.file);
    }
    Ok(out)
}

fn render_pairs(file: &ExpansionFile, map: &RangeMap) -> String {
    let mut out = String::new();
    match file.fingerprint() {
        Some(fp) => {
            let _ = writeln!(out, "{file} (fingerprint {fp}, {} pairs)", map.len());
        }
        None => {
            let _ = writeln!(out, "{file} ({} pairs)", map.len());
        }
    }
    for pair in map.pairs() {
        let kind = if pair.literal { "literal" } else { "synthesized" };
        let _ = writeln!(out, "  {} -> {}  {kind}", pair.target, pair.source);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GlobalArgs;
    use expanse_source::MappedRange;

    fn foo_map() -> RangeMap {
        RangeMap::new(vec![
            MappedRange::literal(TextRange::new(0, 1), TextRange::new(5, 6)),
            MappedRange::synthesized(TextRange::new(1, 4), TextRange::new(0, 10)),
            MappedRange::literal(TextRange::new(4, 5), TextRange::new(8, 9)),
        ])
        .unwrap()
    }

    fn project_with(dir: &std::path::Path, name: &str) -> Project {
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: dir.to_str().map(str::to_string),
            store: None,
        };
        let project = Project::open(&global).unwrap();
        let file = ExpansionFile::new(name).unwrap();
        let storage = &project.storage;
        storage.put_range_map(&storage.write(), &file, foo_map()).unwrap();
        project
    }

    #[test]
    fn pairs_render_with_kind() {
        let file = ExpansionFile::new("a.rs").unwrap();
        let out = render_pairs(&file, &foo_map());
        assert!(out.starts_with("a.rs (3 pairs)\n"));
        assert!(out.contains("  [0, 1) -> [5, 6)  literal\n"));
        assert!(out.contains("  [1, 4) -> [0, 10)  synthesized\n"));
    }

    #[test]
    fn text_listing_shows_status() {
        let records = vec![
            RecordInfo {
                file: ExpansionFile::new("a.rs").unwrap(),
                fingerprint: None,
                status: RecordStatus::Valid { pairs: 3 },
            },
            RecordInfo {
                file: ExpansionFile::new("b.rs").unwrap(),
                fingerprint: None,
                status: RecordStatus::Outdated { version: 1 },
            },
        ];
        let out = render_records(&records, ReportFormat::Text).unwrap();
        assert_eq!(out, "a.rs  valid, 3 pairs\nb.rs  outdated, schema v1\n");
    }

    #[test]
    fn json_listing_parses() {
        let records = vec![RecordInfo {
            file: ExpansionFile::new("a.rs").unwrap(),
            fingerprint: None,
            status: RecordStatus::Corrupt {
                reason: "truncated".to_string(),
            },
        }];
        let out = render_records(&records, ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["status"], "corrupt");
        assert_eq!(value[0]["reason"], "truncated");
    }

    #[test]
    fn load_finds_stored_record() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with(dir.path(), "a.rs");
        let (_, map) = load(&project, "a.rs").unwrap();
        assert_eq!(map, foo_map());
    }

    #[test]
    fn load_missing_record_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with(dir.path(), "a.rs");
        let err = load(&project, "b.rs").unwrap_err();
        assert!(err.to_string().contains("no expansion record"));
    }

    #[test]
    fn load_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with(dir.path(), "a.rs");
        assert!(load(&project, "../a.rs").is_err());
    }

    #[test]
    fn map_unmapped_range_exits_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with(dir.path(), "a.rs");
        let args = MapArgs {
            file: "a.rs".to_string(),
            start: 2,
            end: None,
            reverse: false,
            text: None,
        };
        assert_eq!(map(&project, &args).unwrap(), 1);
    }

    #[test]
    fn map_inverted_range_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with(dir.path(), "a.rs");
        let args = MapArgs {
            file: "a.rs".to_string(),
            start: 4,
            end: Some(2),
            reverse: true,
            text: None,
        };
        assert!(map(&project, &args).is_err());
    }

    #[test]
    fn mapped_range_with_line_col() {
        let index = LineIndex::new("fn main() {\n    foo!(a, b);\n}\n");
        // `b` in the invocation on line 2.
        assert_eq!(
            render_mapped(TextRange::new(24, 25), Some(&index)),
            "[24, 25)  2:13-2:14"
        );
        assert_eq!(render_mapped(TextRange::new(24, 25), None), "[24, 25)");
        assert_eq!(
            render_mapped(TextRange::new(90, 91), Some(&index)),
            "[90, 91)  (outside the given text)"
        );
    }

    #[test]
    fn map_reads_text_file_for_positions() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with(dir.path(), "a.rs");
        let text = dir.path().join("call.rs");
        std::fs::write(&text, "foo!(a, b)").unwrap();
        let args = MapArgs {
            file: "a.rs".to_string(),
            start: 4,
            end: None,
            reverse: false,
            text: text.to_str().map(str::to_string),
        };
        assert_eq!(map(&project, &args).unwrap(), 0);
    }

    #[test]
    fn map_missing_text_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with(dir.path(), "a.rs");
        let args = MapArgs {
            file: "a.rs".to_string(),
            start: 4,
            end: None,
            reverse: false,
            text: dir.path().join("missing.rs").to_str().map(str::to_string),
        };
        assert!(map(&project, &args).is_err());
    }
}
