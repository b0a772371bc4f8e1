use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod generate;
mod invoke;
mod lexicon;
mod lm_log;
mod model;
mod reconcile;
mod store;
mod templates;

use cli::{Command, GenerateArgs, ReconcileArgs, RootArgs};
use config::InvokeSettings;
use generate::{GenerationPipeline, GenerationSettings, RunSummary};
use invoke::{cancel, InvocationClient};
use lexicon::{Lexicon, Vocabulary};
use reconcile::batch::{self, InputRecord, OutputRecord};
use reconcile::confirm::{AssumeYes, Confirm, TerminalConfirm};
use reconcile::{plan, ReconcileOptions, ReconcileReport};
use store::RelationStore;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = RootArgs::parse();
    match args.command {
        Command::Generate(args) => run_generate(args).await,
        Command::Reconcile(args) => run_reconcile(args),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_generate(args: GenerateArgs) -> Result<()> {
    let invoke = InvokeSettings::new(args.temperature, args.attempts)?;
    if args.chunk_size == 0 {
        return Err(anyhow!("--chunk-size must be at least 1"));
    }
    let lexicon = Lexicon::load(&args.lexicon)?;
    let vocabulary = Vocabulary::load(&args.vocabulary)?;
    if args.start > lexicon.len() {
        return Err(anyhow!(
            "--start {} is past the end of the word list ({} nouns)",
            args.start,
            lexicon.len()
        ));
    }
    let backend = config::resolve_backend(args.lm.as_deref())?;
    let transport = config::build_transport(&backend, Duration::from_secs(args.timeout_secs))?;
    let mut store = RelationStore::open(&args.db)?;
    tracing::info!(
        backend = %backend.describe(),
        nouns = lexicon.len(),
        vocabulary = vocabulary.len(),
        db = %args.db.display(),
        "starting generation"
    );
    if lexicon.is_empty() {
        tracing::warn!(lexicon = %args.lexicon.display(), "lexicon has no usable nouns");
    }
    if vocabulary.is_empty() {
        tracing::warn!("vocabulary is empty; every derived form will be rejected");
    }

    let (handle, signal) = cancel::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current chunk");
            handle.cancel();
        }
    });

    let client = InvocationClient::new(transport).with_cancel(signal);
    let settings = GenerationSettings {
        invoke,
        policy: args.derived_policy,
        lm_log: args.lm_log,
    };
    let summary = GenerationPipeline::new(&client, &mut store, &vocabulary, settings)
        .run(lexicon.nouns(), args.start, args.chunk_size)
        .await?;
    print_generation_summary(&summary, lexicon.len(), &args.db);
    println!(
        "store holds {} words and {} derived forms",
        store.count_words()?,
        store.count_derived_forms()?
    );
    Ok(())
}

fn print_generation_summary(summary: &RunSummary, total: usize, db: &Path) {
    println!(
        "chunks committed: {}, skipped: {}",
        summary.chunks_committed, summary.chunks_skipped
    );
    println!(
        "words inserted: {}, derived forms inserted: {} (accepted {}, rejected {}, replaced {})",
        summary.words_inserted,
        summary.forms_inserted,
        summary.forms_accepted,
        summary.forms_rejected,
        summary.forms_replaced
    );
    if !summary.skipped_starts.is_empty() {
        let starts: Vec<String> = summary.skipped_starts.iter().map(usize::to_string).collect();
        println!("skipped chunks start at: {}", starts.join(", "));
    }
    if summary.next_start < total {
        let reason = if summary.cancelled { "interrupted" } else { "stopped" };
        println!(
            "{reason} at word {} of {total}; resume with --start {}",
            summary.next_start, summary.next_start
        );
    } else {
        println!("all {total} words processed into {}", db.display());
    }
}

fn run_reconcile(args: ReconcileArgs) -> Result<()> {
    let inputs: Vec<InputRecord> = batch::read_jsonl(&args.input)?;
    let outputs: Vec<OutputRecord> = batch::read_jsonl(&args.output)?;
    let store = RelationStore::open_read_only(&args.db)?;
    println!("Found {} outputs to check", outputs.len());

    let options = ReconcileOptions {
        auto_confirm: args.yes,
        scope: args.match_scope,
        ..ReconcileOptions::default()
    };
    let mut gate: Box<dyn Confirm> = if args.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalConfirm::stdin())
    };
    let report = reconcile::reconcile(inputs, &outputs, &store, &options, gate.as_mut())?;
    plan::write_sql_artifact(&args.plan_out, &report.candidates)?;
    print_reconcile_report(&report, &args);
    Ok(())
}

fn print_reconcile_report(report: &ReconcileReport, args: &ReconcileArgs) {
    println!(
        "negative judgments: {}, confirmed: {}, declined: {}",
        report.negative_judgments,
        report.confirmed.len(),
        report.declined
    );
    let skipped = report.missing_correlation + report.unparseable_inputs + report.missing_judgment;
    if skipped > 0 {
        println!(
            "skipped {skipped} of {} outputs \
             (uncorrelated {}, unparseable question {}, no answer {})",
            report.outputs_seen,
            report.missing_correlation,
            report.unparseable_inputs,
            report.missing_judgment
        );
    }
    if report.confirmed.is_empty() {
        println!("No confirmed deletions.");
        return;
    }
    for root in &report.unmatched_roots {
        println!("  - no word row with lemma='{root}'");
    }
    if report.pairs_without_rows > 0 {
        println!(
            "  - {} confirmed pair(s) had no derived rows in scope",
            report.pairs_without_rows
        );
    }
    if report.candidates.is_empty() {
        println!("No rows to delete (dry run).");
        return;
    }
    println!("Dry run: the following DELETE statements would be executed:");
    for candidate in &report.candidates {
        println!("  {}", candidate.statement());
    }
    let db = args.db.display();
    let plan_out = args.plan_out.display();
    println!();
    println!("Saved {} statement(s) to {plan_out}", report.candidates.len());
    println!("Nothing was deleted. To apply the plan:");
    println!("  1) back up {db}");
    println!("  2) open it with: sqlite3 {db}");
    println!("  3) run: .read {plan_out}");
}
