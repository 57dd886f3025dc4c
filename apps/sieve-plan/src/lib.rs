use std::{
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use clap::Parser;
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use sieve_domain::{request::QueryRequest, smart::FilterCollection};
use sieve_service::{
	BoxFuture, CallerContext, Collaborators, Error, SearchBackend, SearchPage, SearchPlan,
	SieveService,
};

#[derive(Debug, Parser)]
#[command(version = env!("CARGO_PKG_VERSION"), rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// JSON query request, or `{ "collections": [...], "offset": 0, "limit": 10 }` for smart
	/// filters.
	#[arg(long, short = 'r', value_name = "FILE")]
	pub request: PathBuf,
	#[arg(long, short = 'u', default_value = "sieve-plan")]
	pub user: String,
	#[arg(long, short = 'p')]
	pub partition: String,
	/// Comma-separated group list.
	#[arg(long, short = 'g', default_value = "")]
	pub groups: String,
	#[arg(long)]
	pub root: bool,
}
impl Args {
	fn caller(&self) -> CallerContext {
		CallerContext {
			root: self.root,
			..CallerContext::from_groups_header(&self.user, &self.partition, &self.groups)
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RequestFile {
	Smart {
		collections: Vec<FilterCollection>,
		#[serde(default)]
		offset: u32,
		limit: u32,
	},
	Query(QueryRequest),
}

#[derive(Debug, Serialize)]
struct PlanOutput {
	index: String,
	body: Value,
}

/// Compiles plans only; any attempt to execute one is an error.
struct PlanOnlyBackend;
impl SearchBackend for PlanOnlyBackend {
	fn open_point_in_time<'a>(
		&'a self,
		_index: &'a str,
		_keep_alive: &'a str,
	) -> BoxFuture<'a, sieve_service::Result<String>> {
		Box::pin(async move { Err(not_executed()) })
	}

	fn close_point_in_time<'a>(
		&'a self,
		_pit_id: &'a str,
	) -> BoxFuture<'a, sieve_service::Result<()>> {
		Box::pin(async move { Err(not_executed()) })
	}

	fn search<'a>(
		&'a self,
		_plan: &'a SearchPlan,
	) -> BoxFuture<'a, sieve_service::Result<SearchPage>> {
		Box::pin(async move { Err(not_executed()) })
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = sieve_config::load(&args.config)?;
	init_tracing(&config)?;
	let caller = args.caller();
	let collaborators = Collaborators::new(&config, Arc::new(PlanOnlyBackend));
	let service = SieveService::from_config(config, collaborators)?;
	let request = match read_request(&args.request)? {
		RequestFile::Smart { collections, offset, limit } =>
			service.smart_search_request(&collections, offset, limit)?,
		RequestFile::Query(request) => request,
	};
	let plan = service.plan(&caller, &request).await?;

	tracing::info!(index = %plan.index, partition = %caller.partition_id, "Plan compiled.");

	let output = PlanOutput { index: plan.index.clone(), body: plan.to_value() };
	let json = serde_json::to_string_pretty(&output)?;

	println!("{json}");

	Ok(())
}

fn read_request(path: &Path) -> color_eyre::Result<RequestFile> {
	let raw = fs::read_to_string(path)
		.map_err(|err| eyre::eyre!("Failed to read request {}: {err}", path.display()))?;

	parse_request(&raw)
}

fn parse_request(raw: &str) -> color_eyre::Result<RequestFile> {
	serde_json::from_str(raw).map_err(|err| eyre::eyre!("Failed to parse request: {err}"))
}

fn not_executed() -> Error {
	Error::Backend { message: "sieve-plan does not execute searches.".to_string() }
}

fn init_tracing(config: &sieve_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_writer(std::io::stderr).with_env_filter(filter).init();
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn args_build_a_root_caller() {
		let args = Args::try_parse_from([
			"sieve-plan",
			"--config",
			"sieve.toml",
			"--request",
			"request.json",
			"--partition",
			"tenant1",
			"--groups",
			"a@x.com,b@x.com",
			"--root",
		])
		.expect("Arguments must parse.");
		let caller = args.caller();

		assert_eq!(caller.user_id, "sieve-plan");
		assert_eq!(caller.groups, vec!["a@x.com", "b@x.com"]);
		assert!(caller.root);
	}

	#[test]
	fn request_files_accept_both_shapes() {
		let smart = parse_request(
			r#"{ "collections": [{ "filters": [{ "name": "type", "value": "well" }] }], "limit": 5 }"#,
		)
		.expect("Smart request must parse.");

		assert!(matches!(smart, RequestFile::Smart { limit: 5, offset: 0, .. }));

		let query = parse_request(r#"{ "kind": "osdu:wks:well:1.0.0", "query": "data.Name:x" }"#)
			.expect("Query request must parse.");

		let RequestFile::Query(request) = query else {
			panic!("Expected a plain query request.");
		};

		assert_eq!(request.kind, "osdu:wks:well:1.0.0");
	}

	#[test]
	fn requests_without_kind_or_collections_are_rejected() {
		assert!(parse_request(r#"{ "query": "x" }"#).is_err());
	}
}
