use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use ragbrief::{config::ApiOverrides, search::RetrievalConfig};

#[derive(Debug, Parser)]
#[command(
    name = "ragbrief",
    about = "Hybrid retrieval, grounded answers and research briefs over a document corpus"
)]
pub struct Cli {
    /// JSON Lines corpus: one {"id", "text", "metadata"} object per line
    #[arg(long, global = true)]
    pub corpus: Option<PathBuf>,

    #[command(flatten)]
    pub api: ApiArgs,

    #[command(flatten)]
    pub retrieval: RetrievalArgs,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Retrieval knobs for this invocation.
    ///
    /// `eval` asks each retriever for `k` candidates unless `--candidates`
    /// is given.
    pub fn retrieval_config(&self) -> RetrievalConfig {
        let mut base = RetrievalConfig::default();
        if let Command::Eval(args) = &self.command {
            base.candidates_per_retriever = args.k;
        }
        self.retrieval.apply(base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Hybrid search: dense + BM25, fused and reranked
    Search(SearchArgs),
    /// Answer a question from the retrieved context, with citations
    Ask(AskArgs),
    /// Write a research brief: research, summarize, critique, write
    Research(ResearchArgs),
    /// Measure recall@k and MRR@k over labeled queries
    Eval(EvalArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Model services --

#[derive(Debug, Args)]
pub struct ApiArgs {
    /// Base URL of the OpenAI-compatible API [env: RAGBRIEF_BASE_URL]
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Chat model used for answers and briefs [env: RAGBRIEF_CHAT_MODEL]
    #[arg(long, global = true)]
    pub chat_model: Option<String>,

    /// Embedding model [env: RAGBRIEF_EMBED_MODEL]
    #[arg(long, global = true)]
    pub embed_model: Option<String>,

    /// Base URL of the cross-encoder rerank service [env: RAGBRIEF_RERANK_URL]
    #[arg(long, global = true)]
    pub rerank_url: Option<String>,

    /// Per-call timeout for every external service [env: RAGBRIEF_TIMEOUT_SECS]
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

impl ApiArgs {
    pub fn overrides(&self) -> ApiOverrides {
        ApiOverrides {
            base_url: self.base_url.clone(),
            chat_model: self.chat_model.clone(),
            embed_model: self.embed_model.clone(),
            rerank_url: self.rerank_url.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

// -- Retrieval tuning --

#[derive(Debug, Args)]
pub struct RetrievalArgs {
    /// Chunks requested from each of the dense and sparse retrievers
    #[arg(long, global = true)]
    pub candidates: Option<usize>,

    /// Fused candidates passed to the reranker
    #[arg(long, global = true)]
    pub fusion_width: Option<usize>,

    /// Reranked chunks kept
    #[arg(long, global = true)]
    pub final_count: Option<usize>,
}

impl RetrievalArgs {
    pub fn apply(&self, base: RetrievalConfig) -> RetrievalConfig {
        RetrievalConfig {
            candidates_per_retriever: self
                .candidates
                .unwrap_or(base.candidates_per_retriever),
            fusion_width: self.fusion_width.unwrap_or(base.fusion_width),
            final_count: self.final_count.unwrap_or(base.final_count),
            ..base
        }
    }
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Number of results to return (defaults to --final-count)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question to answer
    pub question: String,

    /// Output the answer and citations as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Research --

#[derive(Debug, Parser)]
pub struct ResearchArgs {
    /// The research question
    pub question: String,

    /// Output {"report", "retrievedCount"} as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Eval --

#[derive(Debug, Parser)]
pub struct EvalArgs {
    /// JSON Lines file of {"query", "expected_ids"} objects
    pub queries: PathBuf,

    /// Cut-off rank for recall and MRR
    #[arg(short, long, default_value = "10")]
    pub k: usize,

    /// Output metrics as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "ragbrief",
            &mut std::io::stdout(),
        );
    }
}
