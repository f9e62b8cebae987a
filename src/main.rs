use std::{path::Path, sync::Arc};

use clap::Parser;
use ragbrief::{
    Error,
    Result,
    answer::Answerer,
    capability::Deadline,
    config::ApiSettings,
    corpus,
    cross_encoder::CrossEncoderClient,
    eval,
    memory_index::{EMBED_BATCH_SIZE, MemoryIndex},
    openai::OpenAiClient,
    search::{self, RetrievalPipeline},
    synthesis::{SynthesisConfig, SynthesisPipeline},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, LogFormat};

type Models = Deadline<OpenAiClient>;
type Scorer = Deadline<CrossEncoderClient>;
type Pipeline = RetrievalPipeline<Models, MemoryIndex, MemoryIndex, Scorer>;

fn init_tracing(verbose: u8, quiet: bool, format: LogFormat) {
    let filter = if let Ok(env) = std::env::var("RAGBRIEF_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.without_time().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet, cli.log_format);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli))
}

/// Long-lived clients, built once and shared by every command.
struct Services {
    models: Arc<Models>,
    pipeline: Arc<Pipeline>,
}

impl Services {
    async fn build(cli: &Cli) -> Result<Self> {
        let corpus_path = cli.corpus.as_deref().ok_or_else(|| {
            Error::Config("--corpus <file.jsonl> is required".into())
        })?;
        let settings = ApiSettings::resolve(&cli.api.overrides())?;
        info!(
            base_url = %settings.base_url,
            chat_model = %settings.chat_model,
            embed_model = %settings.embed_model,
            rerank_url = %settings.rerank_url,
            "model services configured"
        );

        let models = Arc::new(Deadline::new(
            OpenAiClient::new(&settings)?,
            settings.timeout,
        ));
        let scorer = Arc::new(Deadline::new(
            CrossEncoderClient::new(&settings)?,
            settings.timeout,
        ));

        let index = Arc::new(load_index(corpus_path, models.as_ref()).await?);
        let config = cli.retrieval_config();
        let pipeline = Arc::new(RetrievalPipeline::new(
            models.clone(),
            index.clone(),
            index,
            scorer,
            config,
        ));

        Ok(Self { models, pipeline })
    }
}

async fn load_index(path: &Path, embedder: &Models) -> Result<MemoryIndex> {
    let documents = corpus::read_documents(path)?;
    if documents.is_empty() {
        return Err(Error::InvalidInput(format!(
            "corpus {} contains no documents",
            path.display()
        )));
    }
    MemoryIndex::embed_corpus(embedder, documents, EMBED_BATCH_SIZE).await
}

async fn run(cli: Cli) -> Result<()> {
    let services = Services::build(&cli).await?;

    match cli.command {
        Command::Search(args) => {
            let results = match args.count {
                Some(count) => {
                    services.pipeline.search_top(&args.query, count).await?
                }
                None => services.pipeline.search(&args.query).await?,
            };

            if args.json {
                println!("{}", search::format_json(&results, &args.query)?);
            } else {
                print!("{}", search::format_human(&results));
            }
        }
        Command::Ask(args) => {
            let final_count = services.pipeline.config().final_count;
            let answerer =
                Answerer::new(services.pipeline.clone(), services.models.clone())
                    .with_count(final_count);
            let answer = answerer.answer(&args.question).await?;

            if args.json {
                println!("{}", serde_json::to_string(&answer)?);
            } else {
                println!("{}", answer.text);
                if !answer.citations.is_empty() {
                    let sources: Vec<&str> =
                        answer.citations.iter().map(String::as_str).collect();
                    println!("\nsources: {}", sources.join(", "));
                }
            }
        }
        Command::Research(args) => {
            let synthesis = SynthesisPipeline::new(
                services.pipeline.clone(),
                services.models.clone(),
                SynthesisConfig::default(),
            );
            let outcome = synthesis.run(&args.question).await?;

            if args.json {
                println!("{}", serde_json::to_string(&outcome)?);
            } else {
                println!("{}", outcome.report);
                eprintln!("\n({} chunks retrieved)", outcome.retrieved_count);
            }
        }
        Command::Eval(args) => {
            let queries = corpus::read_labeled_queries(&args.queries)?;
            let metrics =
                eval::evaluate(services.pipeline.as_ref(), &queries, args.k)
                    .await?;

            if args.json {
                println!("{}", serde_json::to_string(&metrics)?);
            } else {
                println!("recall@{}: {:.3}", args.k, metrics.recall_at_k);
                println!("mrr@{}:    {:.3}", args.k, metrics.mrr_at_k);
                println!("queries:   {}", metrics.queries);
            }
        }
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}
