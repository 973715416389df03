//! Pathforge CLI
//!
//! - `paths`: inspect the path tree of a pathbuilder definition
//! - `endpoints`: project listing/item endpoints into pruned, renamed trees
//! - `filter`: write a pathbuilder subset selected by `element=value` clauses

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use pathforge_core::{
    Diagnostic, Endpoint, EndpointKind, EndpointMeta, EndpointOptions, EndpointRegistry,
    EndpointRequest, EndpointSpec, FilterMode, PathNode, PathTree, PrefixMap,
    ProjectionConfig, Projector, TreeBuilder, DEFAULT_MAX_DEPTH, DEFAULT_PAGE_SIZE,
};
use pathforge_ingest::{
    filter_entries, read_pathbuilder_file, read_pathbuilder_str, write_pathbuilder,
    Clause, ReadOptions,
};

#[derive(Parser)]
#[command(name = "pathforge")]
#[command(
    author,
    version,
    about = "Pathforge: pathbuilder trees projected into endpoint models"
)]
struct Cli {
    /// Pathbuilder file (XML, or a JSON export with an `xml` member)
    input: PathBuf,

    /// Increase logging verbosity: default WARN, -v INFO, -vv DEBUG, -vvv TRACE
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect pathbuilder definitions
    Paths(PathsArgs),
    /// Project endpoint trees from include/exclude field lists
    Endpoints(EndpointsArgs),
    /// Create a filtered pathbuilder file
    Filter(FilterArgs),
}

#[derive(Args)]
struct PathsArgs {
    /// Only show the tree below this path id
    #[arg(long)]
    id: Option<String>,

    /// Also show disabled paths
    #[arg(long)]
    include_disabled: bool,

    /// Print the tree as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct EndpointsArgs {
    /// Listing endpoint: "SPEC FIELD..." with one or more fields to include
    #[arg(long = "listing-include", visible_alias = "li", value_name = "SPEC FIELD...")]
    listing_include: Vec<String>,

    /// Listing endpoint: "SPEC [FIELD...]", every field not listed is included
    #[arg(long = "listing-exclude", visible_alias = "le", value_name = "SPEC FIELD...")]
    listing_exclude: Vec<String>,

    /// Item endpoint: "SPEC KEY_FIELD FIELD..." with one or more fields to include
    #[arg(long = "item-include", visible_alias = "ii", value_name = "SPEC KEY FIELD...")]
    item_include: Vec<String>,

    /// Item endpoint: "SPEC KEY_FIELD [FIELD...]", every field not listed is included
    #[arg(long = "item-exclude", visible_alias = "ie", value_name = "SPEC KEY FIELD...")]
    item_exclude: Vec<String>,

    /// Default page size for listing endpoints
    #[arg(short = 's', long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Also make fields with cardinality 1 optional
    #[arg(short = '0', long)]
    everything_optional: bool,

    /// Namespace replacement, repeatable: --prefix crm http://www.cidoc-crm.org/cidoc-crm/
    #[arg(short, long, num_args = 2, value_names = ["PREFIX", "IRI"], action = ArgAction::Append)]
    prefix: Vec<String>,

    /// Write one JSON file per endpoint, using this filename prefix
    #[arg(short, long)]
    output_prefix: Option<String>,

    /// Deepest level a projection may reach before it counts as unresolved recursion (at most 128)
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Do not follow entity references at all
    #[arg(long)]
    no_references: bool,
}

#[derive(Args)]
struct FilterArgs {
    /// Clauses like `id=person` or `enabled=0`; paths matching any clause are kept
    #[arg(required = true, value_name = "ELEMENT=VALUE")]
    clauses: Vec<Clause>,

    /// Output file; prints to stdout if not given
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Check the result by parsing it once more
    #[arg(long)]
    validate: bool,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Paths(args) => cmd_paths(&cli.input, &args),
        Commands::Endpoints(args) => cmd_endpoints(&cli.input, &args),
        Commands::Filter(args) => cmd_filter(&cli.input, &args),
    }
}

fn load_tree(input: &Path, options: &ReadOptions) -> Result<PathTree> {
    let pathbuilder = read_pathbuilder_file(input, options)
        .with_context(|| format!("reading pathbuilder {}", input.display()))?;
    let records = pathbuilder.records();
    let built = TreeBuilder::new()
        .include_disabled(options.include_disabled)
        .build(&records);
    report_diagnostics("path tree", &built.diagnostics);
    Ok(built.tree)
}

fn report_diagnostics(what: &str, diagnostics: &[Diagnostic]) {
    if !diagnostics.is_empty() {
        eprintln!(
            "{} {} warning(s) while building {what}",
            "!".yellow().bold(),
            diagnostics.len()
        );
    }
}

// ============================================================================
// paths
// ============================================================================

fn cmd_paths(input: &Path, args: &PathsArgs) -> Result<()> {
    let options = ReadOptions {
        include_disabled: args.include_disabled,
    };
    let tree = load_tree(input, &options)?;

    let selected: Vec<&PathNode> = match &args.id {
        Some(id) => vec![tree
            .node(id)
            .ok_or_else(|| anyhow!("no path with id '{id}'"))?],
        None => tree.roots().collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    println!(
        "{} {} paths, {} root types",
        "Pathbuilder".green().bold(),
        tree.len(),
        tree.root_types().count()
    );
    for node in selected {
        print_node(node, 0);
    }
    let detached: Vec<&str> = tree.detached().map(|n| n.id.as_str()).collect();
    if args.id.is_none() && !detached.is_empty() {
        println!("{} {}", "Detached:".yellow(), detached.join(", "));
    }
    Ok(())
}

fn print_node(node: &PathNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let mut line = format!("{indent}{}", node.id.bold());
    if let Some(class_name) = &node.class_name {
        line.push_str(&format!(" {}", class_name.cyan()));
    }
    if let Some(value_type) = node.value_type {
        line.push_str(&format!(" : {}", value_type.as_str()));
    }
    if node.is_single() {
        line.push_str(" [1]");
    }
    if let Some(target) = node.entity_reference.target() {
        line.push_str(&format!(" {} {target}", "→".cyan()));
    }
    if let Some(class) = node.terminal_class().filter(|_| depth == 0) {
        line.push_str(&format!(" ({})", class.dimmed()));
    }
    println!("{line}");
    for child in &node.fields {
        print_node(child, depth + 1);
    }
}

// ============================================================================
// endpoints
// ============================================================================

fn parse_requests(values: &[String], kind: EndpointKind, mode: FilterMode) -> Result<Vec<EndpointRequest>> {
    values
        .iter()
        .map(|value| {
            let mut words = value.split_whitespace();
            let spec: EndpointSpec = words
                .next()
                .ok_or_else(|| anyhow!("empty endpoint definition"))?
                .parse()?;
            let request = match kind {
                EndpointKind::Listing => {
                    EndpointRequest::listing(spec, mode, words.map(str::to_string).collect())
                }
                EndpointKind::Item => {
                    let key_field = words
                        .next()
                        .ok_or_else(|| anyhow!("item endpoint '{spec}' needs a key field"))?;
                    EndpointRequest::item(spec, key_field, mode, words.map(str::to_string).collect())
                }
            };
            Ok(request)
        })
        .collect()
}

fn prefix_map(values: &[String]) -> PrefixMap {
    values
        .chunks(2)
        .filter_map(|pair| match pair {
            [prefix, iri] => Some((prefix.clone(), iri.clone())),
            _ => None,
        })
        .collect()
}

#[derive(Serialize)]
struct EndpointOutput<'a> {
    endpoint: Option<&'a EndpointMeta>,
    root: &'a PathNode,
    diagnostics: &'a [Diagnostic],
}

fn cmd_endpoints(input: &Path, args: &EndpointsArgs) -> Result<()> {
    let tree = load_tree(input, &ReadOptions::default())?;
    let prefixes = prefix_map(&args.prefix);

    let mut requests = Vec::new();
    requests.extend(parse_requests(&args.listing_include, EndpointKind::Listing, FilterMode::Include)?);
    requests.extend(parse_requests(&args.item_include, EndpointKind::Item, FilterMode::Include)?);
    requests.extend(parse_requests(&args.listing_exclude, EndpointKind::Listing, FilterMode::Exclude)?);
    requests.extend(parse_requests(&args.item_exclude, EndpointKind::Item, FilterMode::Exclude)?);
    if requests.is_empty() {
        return Err(anyhow!(
            "no endpoints given, use --listing-include/--item-include/--listing-exclude/--item-exclude"
        ));
    }

    let config = ProjectionConfig {
        max_depth: args.max_depth,
        resolve_entity_references: !args.no_references,
    };
    let options = EndpointOptions {
        page_size: args.page_size,
        everything_optional: args.everything_optional,
        output_prefix: args.output_prefix.clone(),
    };
    let projector = Projector::new(&tree)
        .with_config(config)
        .context("invalid --max-depth")?;
    let mut registry = EndpointRegistry::new(projector, options);

    let mut failed = 0usize;
    for request in &requests {
        match registry.register(request) {
            Ok(endpoint) => {
                println!(
                    "{} {} {}",
                    "Projected".green().bold(),
                    request.kind,
                    endpoint.path()
                );
            }
            Err(err) => {
                failed += 1;
                eprintln!("{} {}: {err}", "Failed".red().bold(), request.spec);
            }
        }
    }

    for endpoint in registry.into_endpoints() {
        emit_endpoint(endpoint, &prefixes, args.output_prefix.is_some())?;
    }

    if failed > 0 {
        return Err(anyhow!("{failed} of {} endpoint(s) failed", requests.len()));
    }
    Ok(())
}

fn emit_endpoint(mut endpoint: Endpoint, prefixes: &PrefixMap, to_file: bool) -> Result<()> {
    for (name, count) in endpoint.names.collisions() {
        tracing::warn!(endpoint = %endpoint.path(), name, count, "binding variable allocated more than once");
    }
    prefixes.compact_tree(&mut endpoint.root);
    report_diagnostics(endpoint.path(), &endpoint.diagnostics);

    let output = EndpointOutput {
        endpoint: endpoint.meta(),
        root: &endpoint.root,
        diagnostics: &endpoint.diagnostics,
    };
    let json = serde_json::to_string_pretty(&output)?;

    if to_file {
        let filename = PathBuf::from(format!("{}.json", endpoint.output_stem));
        if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        tracing::info!(file = %filename.display(), "writing endpoint");
        fs::write(&filename, json).with_context(|| format!("writing {}", filename.display()))?;
        println!("  {} {}", "→".cyan(), filename.display());
    } else {
        println!("{} {}", "──".dimmed(), endpoint.path().bold());
        println!("{json}");
    }
    Ok(())
}

// ============================================================================
// filter
// ============================================================================

fn cmd_filter(input: &Path, args: &FilterArgs) -> Result<()> {
    let options = ReadOptions {
        include_disabled: true,
    };
    let pathbuilder = read_pathbuilder_file(input, &options)
        .with_context(|| format!("reading pathbuilder {}", input.display()))?;

    let kept = filter_entries(&pathbuilder.entries, &args.clauses);
    let xml = write_pathbuilder(kept.iter().copied())?;

    if args.validate {
        tracing::info!("validating filtered pathbuilder definition by parsing it again");
        report_diagnostics("filtered path tree", &validate_filtered(&xml, &options)?);
    }

    match &args.output {
        Some(output) => {
            println!(
                "{} {} of {} paths to {}",
                "Writing".green().bold(),
                kept.len(),
                pathbuilder.len(),
                output.display()
            );
            fs::write(output, xml).with_context(|| format!("writing {}", output.display()))?;
        }
        None => print!("{xml}"),
    }
    Ok(())
}

/// Re-read filtered output and build it. Tree building already reports
/// missing parents, so no separate record check runs.
fn validate_filtered(xml: &str, options: &ReadOptions) -> Result<Vec<Diagnostic>> {
    let reparsed = read_pathbuilder_str(xml, options).context("filtered output does not parse")?;
    let built = TreeBuilder::new()
        .include_disabled(options.include_disabled)
        .build(&reparsed.records());
    Ok(built.diagnostics)
}
