use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "rag",
    about = "Terminal client for a running rag-api server: ingest documents and ask questions"
)]
struct RagCli {
    /// Base URL of the rag-api server.
    #[arg(long, env = "RAGLINE_API_URL", default_value = "http://127.0.0.1:8080")]
    api_url: String,

    /// Seconds before requests to the server time out.
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a UTF-8 text file as one document.
    Ingest {
        /// File to ingest; the file name becomes the document title.
        file: PathBuf,
        /// Override the document title.
        #[arg(long)]
        title: Option<String>,
        /// Source tag stored in chunk metadata.
        #[arg(long, default_value = "file_upload")]
        source: String,
    },
    /// Ask a question against the ingested documents.
    Ask { question: String },
    /// Search for chunks similar to a query without generating an answer.
    Search {
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Show collection statistics.
    Stats,
    /// Delete one chunk by id.
    Delete { chunk_id: String },
    /// Research a topic with the language model (no retrieval).
    Research { topic: String },
    /// Summarize a UTF-8 text file with the language model.
    Summarize { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = RagCli::parse();
    let client = Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs.max(1)))
        .build()
        .context("failed to build HTTP client")?;
    let base = cli.api_url.trim_end_matches('/').to_string();

    match cli.command {
        Command::Ingest {
            file,
            title,
            source,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let title = title.unwrap_or_else(|| {
                file.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "untitled".to_string())
            });
            let response: AddDocumentResponse = post_json(
                &client,
                &format!("{base}/v1/documents"),
                &AddDocumentRequest {
                    title: &title,
                    content: &content,
                    source: &source,
                },
            )?;
            println!("ingested '{title}' as {} chunk(s)", response.chunks_created);
        }
        Command::Ask { question } => {
            let response: AskResponse = post_json(
                &client,
                &format!("{base}/v1/ask"),
                &AskRequest {
                    question: &question,
                },
            )?;
            println!("{}", response.answer);
            if !response.sources_used.is_empty() {
                let mut sources = response.sources_used;
                sources.dedup();
                println!("\nSources: {}", sources.join(", "));
            }
        }
        Command::Search { query, limit } => {
            let url = format!("{base}/v1/search");
            let resp = client
                .get(&url)
                .query(&[("query", query.as_str()), ("limit", &limit.to_string())])
                .send()
                .with_context(|| format!("failed to call {url}"))?;
            let response: SearchResponse = parse_response(resp)?;
            if response.hits.is_empty() {
                println!("no matching chunks");
            }
            for hit in response.hits {
                println!(
                    "[{:.4}] {} ({})\n{}\n",
                    hit.score, hit.title, hit.id, hit.text
                );
            }
        }
        Command::Stats => {
            let url = format!("{base}/v1/stats");
            let resp = client
                .get(&url)
                .send()
                .with_context(|| format!("failed to call {url}"))?;
            let stats: StatsResponse = parse_response(resp)?;
            println!(
                "backend: {}\ncollection: {}\nchunks: {}",
                stats.backend, stats.collection, stats.total_chunks
            );
        }
        Command::Delete { chunk_id } => {
            let url = format!("{base}/v1/documents/{chunk_id}");
            let resp = client
                .delete(&url)
                .send()
                .with_context(|| format!("failed to call {url}"))?;
            match resp.status().as_u16() {
                204 => println!("deleted {chunk_id}"),
                404 => bail!("no chunk with id {chunk_id}"),
                status => bail!("server returned {status}"),
            }
        }
        Command::Research { topic } => {
            let url = format!("{base}/v1/research/{topic}");
            let resp = client
                .get(&url)
                .send()
                .with_context(|| format!("failed to call {url}"))?;
            let response: ResearchResponse = parse_response(resp)?;
            println!("{}", response.research);
        }
        Command::Summarize { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let response: SummarizeResponse = post_json(
                &client,
                &format!("{base}/v1/summarize"),
                &SummarizeRequest { content: &content },
            )?;
            println!("{}", response.summary);
        }
    }
    Ok(())
}

fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    request: &Req,
) -> Result<Resp> {
    let resp = client
        .post(url)
        .json(request)
        .send()
        .with_context(|| format!("failed to call {url}"))?;
    parse_response(resp)
}

fn parse_response<Resp: for<'de> Deserialize<'de>>(
    resp: reqwest::blocking::Response,
) -> Result<Resp> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp
            .text()
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        bail!("server returned {status}: {body}");
    }
    resp.json().context("failed to parse server response")
}

#[derive(Serialize)]
struct AddDocumentRequest<'a> {
    title: &'a str,
    content: &'a str,
    source: &'a str,
}

#[derive(Debug, Deserialize)]
struct AddDocumentResponse {
    chunks_created: usize,
}

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    answer: String,
    sources_used: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    title: String,
    text: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    backend: String,
    collection: String,
    total_chunks: usize,
}

#[derive(Debug, Deserialize)]
struct ResearchResponse {
    research: String,
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct SummarizeResponse {
    summary: String,
}
