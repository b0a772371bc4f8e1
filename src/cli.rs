//! CLI argument parsing for the generation and reconciliation workflows.
use crate::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS};
use crate::reconcile::MatchScope;
use crate::store::DerivedFormPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_DB: &str = "relations_italian.db3";
pub const DEFAULT_PLAN_OUT: &str = "deletions.sql";

#[derive(Parser, Debug)]
#[command(
    name = "morpho",
    version,
    about = "Build and reconcile Italian morphological relations with a language model",
    after_help = concat!(
        "Examples:\n",
        "  morpho generate --lexicon nouns.tsv --vocabulary paisa.csv --lm 'llm -m mistral'\n",
        "  morpho generate --lexicon nouns.tsv --vocabulary paisa.csv --start 1200\n",
        "  morpho reconcile --input check.jsonl --output results.jsonl --db relations_italian.db3",
    ),
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Generate(GenerateArgs),
    Reconcile(ReconcileArgs),
}

#[derive(Parser, Debug)]
#[command(about = "Derive adjective/adverb/verb forms for nouns and store them")]
pub struct GenerateArgs {
    /// Lemma list, one per line, optionally `lemma<TAB>pos`
    #[arg(long, value_name = "PATH")]
    pub lexicon: PathBuf,

    /// Attested-word frequency list (`lemma,freq,...`) used to reject invented forms
    #[arg(long, value_name = "PATH")]
    pub vocabulary: PathBuf,

    /// SQLite database to write (created if missing)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_DB)]
    pub db: PathBuf,

    /// Index of the first word to process (resume point)
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Words per model request
    #[arg(long, default_value_t = 5)]
    pub chunk_size: usize,

    /// Command that reads a prompt on stdin and writes the answer on stdout
    #[arg(long, value_name = "COMMAND")]
    pub lm: Option<String>,

    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// Attempts per request before the chunk is skipped
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub attempts: u32,

    /// HTTP request timeout
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = DerivedFormPolicy::Append)]
    pub derived_policy: DerivedFormPolicy,

    /// Append one JSON line per chunk to this file
    #[arg(long, value_name = "PATH")]
    pub lm_log: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Propose deletions for relations a batch judged unrelated (dry run)")]
pub struct ReconcileArgs {
    /// Batch input JSONL (questions)
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Batch output JSONL (answers)
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,

    /// Existing SQLite database (opened read-only)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_DB)]
    pub db: PathBuf,

    /// Accept every negative judgment without prompting
    #[arg(long)]
    pub yes: bool,

    /// Where to write the proposed DELETE statements
    #[arg(long, value_name = "PATH", default_value = DEFAULT_PLAN_OUT)]
    pub plan_out: PathBuf,

    #[arg(long, value_enum, default_value_t = MatchScope::AllForms)]
    pub match_scope: MatchScope,
}
