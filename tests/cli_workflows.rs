use rusqlite::Connection;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const SCHEMA: &str = "
CREATE TABLE words (id INTEGER PRIMARY KEY AUTOINCREMENT, lemma TEXT NOT NULL UNIQUE,
    pos TEXT NOT NULL);
CREATE TABLE derived_forms (id INTEGER PRIMARY KEY AUTOINCREMENT, lemma_id INTEGER NOT NULL,
    form TEXT NOT NULL, pos TEXT NOT NULL, relation_type TEXT NOT NULL,
    FOREIGN KEY (lemma_id) REFERENCES words(id));
";

fn morpho() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_morpho"));
    cmd.env_remove("MORPHO_LM_COMMAND")
        .env_remove("MISTRAL_API_KEY")
        .env("RUST_LOG", "warn");
    cmd
}

/// LM command that drains the prompt and prints `answer_path`.
fn mock_lm(answer_path: &Path) -> String {
    let script = format!(
        "cat >/dev/null; cat {}",
        shell_words::quote(&answer_path.display().to_string())
    );
    shell_words::join(["sh", "-c", script.as_str()])
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("count rows")
}

#[test]
fn generate_persists_validated_forms() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lexicon = dir.path().join("nouns.tsv");
    let vocabulary = dir.path().join("paisa.csv");
    let answer = dir.path().join("answer.json");
    let db = dir.path().join("relations.db3");
    let log = dir.path().join("lm_log.jsonl");
    fs::write(&lexicon, "gatto\ncasa\tn\ncorrere\tv\n").expect("lexicon");
    fs::write(&vocabulary, "# lemma,freq\ncasalingo,120\n").expect("vocabulary");
    fs::write(
        &answer,
        r#"{"gatto": {"morpho": {"a": "N/A", "r": "N/A", "v": "N/A"}},
            "casa": {"morpho": {"a": "casalingo", "r": "casamente", "v": "N/A"}}}"#,
    )
    .expect("answer");

    let output = morpho()
        .arg("generate")
        .arg("--lexicon")
        .arg(&lexicon)
        .arg("--vocabulary")
        .arg(&vocabulary)
        .arg("--db")
        .arg(&db)
        .args(["--chunk-size", "2"])
        .arg("--lm")
        .arg(mock_lm(&answer))
        .arg("--lm-log")
        .arg(&log)
        .output()
        .expect("run morpho generate");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("all 2 words processed"));

    let conn = Connection::open(&db).expect("open db");
    assert_eq!(count(&conn, "words"), 2);
    let (lemma, form, pos): (String, String, String) = conn
        .query_row(
            "SELECT w.lemma, d.form, d.pos FROM derived_forms d JOIN words w ON w.id = d.lemma_id",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .expect("single derived form");
    assert_eq!((lemma.as_str(), form.as_str(), pos.as_str()), ("casa", "casalingo", "a"));

    let log_text = fs::read_to_string(&log).expect("lm log");
    assert_eq!(log_text.lines().count(), 1);
    let entry: serde_json::Value =
        serde_json::from_str(log_text.trim()).expect("log entry json");
    assert_eq!(entry["outcome"], "committed");
    assert_eq!(entry["rejected"], 1);
}

#[test]
fn failing_model_skips_chunks_without_aborting() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lexicon = dir.path().join("nouns.txt");
    let vocabulary = dir.path().join("paisa.csv");
    let db = dir.path().join("relations.db3");
    fs::write(&lexicon, "casa\ngatto\nluna\n").expect("lexicon");
    fs::write(&vocabulary, "casalingo,1\n").expect("vocabulary");

    let output = morpho()
        .arg("generate")
        .arg("--lexicon")
        .arg(&lexicon)
        .arg("--vocabulary")
        .arg(&vocabulary)
        .arg("--db")
        .arg(&db)
        .args(["--chunk-size", "2", "--attempts", "2", "--start", "1"])
        .arg("--lm")
        .arg("sh -c 'cat >/dev/null; exit 3'")
        .output()
        .expect("run morpho generate");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("skipped: 1"), "stdout: {text}");
    assert!(text.contains("skipped chunks start at: 1"), "stdout: {text}");

    let conn = Connection::open(&db).expect("open db");
    assert_eq!(count(&conn, "words"), 0);
}

#[test]
fn generate_without_model_is_a_setup_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let lexicon = dir.path().join("nouns.txt");
    let vocabulary = dir.path().join("paisa.csv");
    fs::write(&lexicon, "casa\n").expect("lexicon");
    fs::write(&vocabulary, "casalingo,1\n").expect("vocabulary");

    let output = morpho()
        .arg("generate")
        .arg("--lexicon")
        .arg(&lexicon)
        .arg("--vocabulary")
        .arg(&vocabulary)
        .arg("--db")
        .arg(dir.path().join("relations.db3"))
        .output()
        .expect("run morpho generate");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no model configured"));
}

struct ReconcileFixture {
    dir: tempfile::TempDir,
    row_id: i64,
}

impl ReconcileFixture {
    fn new(judgment: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = Connection::open(dir.path().join("relations.db3")).expect("create db");
        conn.execute_batch(SCHEMA).expect("schema");
        conn.execute("INSERT INTO words (lemma, pos) VALUES ('casa', 'n')", [])
            .expect("word");
        conn.execute(
            "INSERT INTO derived_forms (lemma_id, form, pos, relation_type)
             VALUES (1, 'casalingo', 'a', 'morphological')",
            [],
        )
        .expect("derived form");
        let row_id = conn.last_insert_rowid();

        let input = serde_json::json!({
            "custom_id": "q-1",
            "body": {"messages": [{"role": "user", "content":
                "Rispondi sì o no. La parola 'casalingo' è collegata con il lemma 'casa'?"}]}
        });
        let output = serde_json::json!({
            "custom_id": "q-1",
            "response": {"status_code": 200, "body": {
                "choices": [{"message": {"content": judgment}}]
            }}
        });
        fs::write(dir.path().join("input.jsonl"), format!("{input}\n")).expect("input jsonl");
        fs::write(dir.path().join("output.jsonl"), format!("{output}\n")).expect("output jsonl");
        Self { dir, row_id }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn command(&self) -> Command {
        let mut cmd = morpho();
        cmd.arg("reconcile")
            .arg("--input")
            .arg(self.path("input.jsonl"))
            .arg("--output")
            .arg(self.path("output.jsonl"))
            .arg("--db")
            .arg(self.path("relations.db3"))
            .arg("--plan-out")
            .arg(self.path("deletions.sql"));
        cmd
    }

    fn derived_count(&self) -> i64 {
        let conn = Connection::open(self.path("relations.db3")).expect("open db");
        count(&conn, "derived_forms")
    }
}

#[test]
fn reconcile_writes_plan_without_deleting() {
    let fixture = ReconcileFixture::new("No, non esiste alcuna relazione");
    let output = fixture
        .command()
        .arg("--yes")
        .output()
        .expect("run morpho reconcile");
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let sql = fs::read_to_string(fixture.path("deletions.sql")).expect("plan");
    let deletes: Vec<&str> = sql.lines().filter(|line| line.starts_with("DELETE")).collect();
    assert_eq!(deletes.len(), 1);
    assert!(deletes[0].contains(&format!("WHERE id = {};", fixture.row_id)));
    assert!(deletes[0].contains("form='casalingo' expected_root='casa'"));
    assert!(stdout(&output).contains(".read"));
    assert_eq!(fixture.derived_count(), 1);
}

#[test]
fn reconcile_declined_at_prompt_proposes_nothing() {
    let fixture = ReconcileFixture::new("No.");
    let mut child = fixture
        .command()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn morpho reconcile");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"n\n")
        .expect("answer prompt");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    assert!(text.contains("[y/N]"), "stdout: {text}");
    assert!(text.contains("No confirmed deletions."), "stdout: {text}");
    let sql = fs::read_to_string(fixture.path("deletions.sql")).expect("plan");
    assert!(sql.is_empty());
    assert_eq!(fixture.derived_count(), 1);
}

#[test]
fn reconcile_missing_inputs_fail_fast() {
    let fixture = ReconcileFixture::new("No.");
    fs::remove_file(fixture.path("input.jsonl")).expect("remove input");
    let output = fixture.command().arg("--yes").output().expect("run");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("batch file not found"));

    let fixture = ReconcileFixture::new("No.");
    fs::remove_file(fixture.path("relations.db3")).expect("remove db");
    let output = fixture.command().arg("--yes").output().expect("run");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("relation store not found"));
    assert!(!fixture.path("relations.db3").exists());
}
