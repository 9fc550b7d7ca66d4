use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use memory_digest::{
    run_digest, summarize_pending_updates_for_user, DigestRunEntry, DigestRunReport,
    DigestSettings, ExtractiveSummarizer, JsonFileUpdateQueue, NewUpdate, PendingUpdateSource,
    UpdateEvent,
};
use memory_markdown::grammar::{PartSeed, RelationshipSeed};
use memory_markdown::{ContentHash, PartFrontmatterUpdate, SectionChange};
use memory_search::{MarkdownSearch, Scope, SearchParams};
use memory_snapshots::{
    format_overview_fragments, load_overview_snapshot, part_profile_path,
    relationship_profile_path, user_overview_path, ListPartsFilter, PartsRepository,
    SnapshotStore,
};
use memory_storage::open_storage;
use serde::Serialize;
use std::io::{self, Read};
use std::path::PathBuf;

pub mod config;

use config::{MemoryConfig, ResolvedConfig};

#[derive(Parser)]
#[command(name = "memory")]
#[command(about = "Per-user markdown memory snapshots", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (only warnings and errors on stderr)
    #[arg(long, global = true)]
    quiet: bool,

    /// Config file (defaults to ./memory.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a document from the grammar if it does not exist yet
    Scaffold(ScaffoldArgs),

    /// Print a parsed document, or one section of it
    Read(ReadArgs),

    /// Append to or replace one section
    Edit(EditArgs),

    /// Print the overview sections used as conversation context
    Overview(UserArgs),

    /// Record a part lifecycle event in the part's change log
    Part(PartArgs),

    /// Query and update part profiles and their frontmatter
    Parts(PartsArgs),

    /// Search a user's documents line by line
    Search(SearchArgs),

    /// List a user's markdown documents
    Ls(LsArgs),

    /// Read a page of one of a user's documents
    Cat(CatArgs),

    /// Queue an update for the next digest run
    Enqueue(EnqueueArgs),

    /// Fold pending updates into user overviews
    Digest(DigestArgs),
}

#[derive(Args)]
struct UserArgs {
    /// User id
    #[arg(long)]
    user: String,
}

/// Selects a document either by raw storage path or by ids.
#[derive(Args)]
struct DocTarget {
    /// Storage path, e.g. users/u1/overview.md
    #[arg(long, conflicts_with_all = ["user", "part", "relationship"])]
    path: Option<String>,

    /// User id (overview unless --part or --relationship is given)
    #[arg(long)]
    user: Option<String>,

    #[arg(long, requires = "user", conflicts_with = "relationship")]
    part: Option<String>,

    #[arg(long, requires = "user")]
    relationship: Option<String>,
}

impl DocTarget {
    fn resolve(&self) -> Result<String> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let Some(user) = self.user.as_deref() else {
            bail!("Either --path or --user is required");
        };
        let path = match (self.part.as_deref(), self.relationship.as_deref()) {
            (Some(part), _) => part_profile_path(user, part)?,
            (None, Some(rel)) => relationship_profile_path(user, rel)?,
            (None, None) => user_overview_path(user)?,
        };
        Ok(path)
    }
}

#[derive(Args)]
struct ScaffoldArgs {
    #[command(subcommand)]
    target: ScaffoldTarget,
}

#[derive(Subcommand)]
enum ScaffoldTarget {
    /// users/<user>/overview.md
    Overview(UserArgs),

    /// users/<user>/parts/<part>.md
    Part {
        #[arg(long)]
        user: String,
        #[arg(long)]
        part: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "emerging")]
        status: String,
        #[arg(long, default_value = "unknown")]
        category: String,
    },

    /// users/<user>/relationships/<relationship>.md
    Relationship {
        #[arg(long)]
        user: String,
        #[arg(long)]
        relationship: String,
        #[arg(long = "type", default_value = "unknown")]
        relationship_type: String,
        #[arg(long, default_value = "active")]
        status: String,
        /// Parts involved (repeatable)
        #[arg(long = "with-part")]
        parts: Vec<String>,
    },
}

#[derive(Args)]
struct ReadArgs {
    #[command(flatten)]
    target: DocTarget,

    /// Only this section
    #[arg(long)]
    anchor: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EditOp {
    Append,
    Replace,
}

#[derive(Args)]
struct EditArgs {
    #[command(flatten)]
    target: DocTarget,

    #[arg(long)]
    anchor: String,

    #[arg(long, value_enum, default_value_t = EditOp::Append)]
    op: EditOp,

    /// Section content; `-` reads stdin
    #[arg(allow_hyphen_values = true)]
    content: String,

    /// Refuse to write unless the document still has this hash (`absent` if it must not exist)
    #[arg(long)]
    expect_hash: Option<String>,
}

#[derive(Args)]
struct PartArgs {
    #[command(subcommand)]
    event: PartEvent,
}

#[derive(Subcommand)]
enum PartEvent {
    Created {
        #[arg(long)]
        user: String,
        #[arg(long)]
        part: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "emerging")]
        status: String,
        #[arg(long, default_value = "unknown")]
        category: String,
    },
    Updated {
        #[arg(long)]
        user: String,
        #[arg(long)]
        part: String,
        #[arg(long)]
        name: String,
        /// What changed, as one line
        #[arg(long)]
        change: String,
    },
}

#[derive(Args)]
struct PartsArgs {
    #[command(subcommand)]
    command: PartsCommand,
}

/// Frontmatter fields shared by `parts new` and `parts set`.
#[derive(Args)]
struct FrontmatterArgs {
    #[arg(long)]
    emoji: Option<String>,

    /// Replaces the tag list; repeat for several tags
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Replaces the related part ids; repeat for several
    #[arg(long = "related")]
    related_parts: Vec<String>,
}

impl FrontmatterArgs {
    fn update(self) -> PartFrontmatterUpdate {
        PartFrontmatterUpdate {
            emoji: self.emoji,
            tags: (!self.tags.is_empty()).then_some(self.tags),
            related_parts: (!self.related_parts.is_empty()).then_some(self.related_parts),
            ..PartFrontmatterUpdate::default()
        }
    }
}

#[derive(Subcommand)]
enum PartsCommand {
    /// Summaries of a user's parts
    List {
        #[arg(long)]
        user: String,
        /// Substring of the part name, any case
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// One part with its frontmatter and sections
    Show {
        #[arg(long)]
        user: String,
        #[arg(long)]
        part: String,
    },
    /// Create a part profile that starts with frontmatter
    New {
        #[arg(long)]
        user: String,
        #[arg(long)]
        part: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "emerging")]
        status: String,
        #[arg(long, default_value = "unknown")]
        category: String,
        #[command(flatten)]
        fields: FrontmatterArgs,
    },
    /// Change frontmatter fields of an existing part
    Set {
        #[arg(long)]
        user: String,
        #[arg(long)]
        part: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[command(flatten)]
        fields: FrontmatterArgs,
    },
}

#[derive(Args)]
struct ScopeArgs {
    #[arg(long)]
    user: String,

    /// Directory below the user root, e.g. parts
    #[arg(long)]
    prefix: Option<String>,

    /// Glob over user-relative paths (repeatable)
    #[arg(long)]
    glob: Vec<String>,
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        Scope {
            user_id: self.user.clone(),
            prefix: self.prefix.clone(),
            globs: self.glob.clone(),
        }
    }
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    #[arg(allow_hyphen_values = true)]
    pattern: String,

    /// Treat the pattern as a regular expression
    #[arg(long)]
    regex: bool,

    /// Regex flags from `imsux`
    #[arg(long)]
    flags: Option<String>,

    /// Match case exactly (searches ignore case by default)
    #[arg(long, conflicts_with = "ignore_case")]
    case_sensitive: bool,

    /// Ignore case (the default)
    #[arg(short = 'i', long)]
    ignore_case: bool,

    #[arg(long, allow_negative_numbers = true)]
    max_matches: Option<i64>,

    /// Characters kept per reported line
    #[arg(long, allow_negative_numbers = true)]
    page_size: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    timeout_ms: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    context_before: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    context_after: Option<i64>,
}

impl SearchArgs {
    fn params(&self) -> SearchParams {
        SearchParams {
            pattern: self.pattern.clone(),
            regex: self.regex,
            flags: self.flags.clone(),
            ignore_case: if self.case_sensitive {
                Some(false)
            } else {
                self.ignore_case.then_some(true)
            },
            max_matches: self.max_matches,
            page_size: self.page_size,
            timeout_ms: self.timeout_ms,
            context_before: self.context_before,
            context_after: self.context_after,
        }
    }
}

#[derive(Args)]
struct LsArgs {
    #[command(flatten)]
    scope: ScopeArgs,

    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct CatArgs {
    #[arg(long)]
    user: String,

    /// Path relative to the user root, e.g. parts/p1.md
    path: String,

    /// Character offset
    #[arg(long, default_value_t = 0)]
    offset: usize,

    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,
}

#[derive(Args)]
struct EnqueueArgs {
    #[arg(long)]
    user: String,

    /// Event JSON, e.g. {"kind":"session","session_id":"s1"}; `-` reads stdin
    event: String,

    #[arg(long)]
    summary: Option<String>,

    /// Opaque metadata JSON carried with the update
    #[arg(long)]
    metadata: Option<String>,
}

#[derive(Args)]
struct DigestArgs {
    /// Only this user
    #[arg(long)]
    user: Option<String>,

    /// Overrides the configured batch limit
    #[arg(long)]
    batch_limit: Option<usize>,

    /// Exit non-zero when any user failed
    #[arg(long)]
    strict: bool,
}

#[derive(Serialize)]
struct MissingDocument<'a> {
    path: &'a str,
    exists: bool,
    hash: ContentHash,
}

#[derive(Serialize)]
struct SectionView<'a> {
    path: &'a str,
    hash: &'a ContentHash,
    anchor: &'a str,
    heading: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct OverviewView {
    user_id: String,
    created: bool,
    context: String,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_arg(raw: &str) -> Result<String> {
    if raw != "-" {
        return Ok(raw.to_string());
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read stdin")?;
    Ok(buf)
}

fn load_config(path: Option<&std::path::Path>) -> Result<ResolvedConfig> {
    let mut config = MemoryConfig::load(path)?;
    config.apply_env()?;
    config.resolve()
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = load_config(cli.config.as_deref())?;
    let storage = open_storage(&config.storage).context("Failed to open snapshot storage")?;
    let store = SnapshotStore::new(storage.clone());

    match cli.command {
        Commands::Scaffold(args) => run_scaffold(&store, args).await?,
        Commands::Read(args) => run_read(&store, args).await?,
        Commands::Edit(args) => run_edit(&store, args).await?,
        Commands::Overview(args) => run_overview(&store, &args.user).await?,
        Commands::Part(args) => run_part(&store, args).await?,
        Commands::Parts(args) => run_parts(PartsRepository::new(store.clone()), args).await?,
        Commands::Search(args) => {
            let search = MarkdownSearch::new(storage);
            let outcome = search
                .search_markdown(&args.scope.scope(), &args.params())
                .await?;
            print_json(&outcome)?;
        }
        Commands::Ls(args) => {
            let search = MarkdownSearch::new(storage);
            let items = search
                .list_markdown_files(&args.scope.scope(), args.limit)
                .await?;
            print_json(&items)?;
        }
        Commands::Cat(args) => {
            let search = MarkdownSearch::new(storage);
            let chunk = search
                .read_markdown(&args.user, &args.path, args.offset, args.limit)
                .await?;
            print_json(&chunk)?;
        }
        Commands::Enqueue(args) => run_enqueue(&config, args).await?,
        Commands::Digest(args) => run_digest_command(&store, &config, args).await?,
    }

    Ok(())
}

async fn run_scaffold(store: &SnapshotStore, args: ScaffoldArgs) -> Result<()> {
    let outcome = match args.target {
        ScaffoldTarget::Overview(user) => store.ensure_overview_exists(&user.user).await?,
        ScaffoldTarget::Part {
            user,
            part,
            name,
            status,
            category,
        } => {
            let seed = PartSeed {
                name: name.unwrap_or_else(|| part.clone()),
                status,
                category,
                ..PartSeed::placeholder(&user, &part)
            };
            store.ensure_part_profile_exists(&seed).await?
        }
        ScaffoldTarget::Relationship {
            user,
            relationship,
            relationship_type,
            status,
            parts,
        } => {
            let seed = RelationshipSeed {
                user_id: user,
                relationship_id: relationship,
                relationship_type,
                status,
                part_ids: parts,
            };
            store.ensure_relationship_profile_exists(&seed).await?
        }
    };
    print_json(&outcome)
}

async fn run_read(store: &SnapshotStore, args: ReadArgs) -> Result<()> {
    let path = args.target.resolve()?;
    let Some(doc) = store.read_document(&path).await? else {
        return print_json(&MissingDocument {
            path: &path,
            exists: false,
            hash: ContentHash::absent(),
        });
    };
    match args.anchor.as_deref() {
        Some(anchor) => {
            let Some(fragment) = doc.fragment(anchor) else {
                bail!("Section '{anchor}' not found in {path}");
            };
            print_json(&SectionView {
                path: &path,
                hash: &doc.hash,
                anchor: &fragment.anchor,
                heading: &fragment.heading,
                text: fragment.text(),
            })
        }
        None => print_json(&doc),
    }
}

async fn run_edit(store: &SnapshotStore, args: EditArgs) -> Result<()> {
    let path = args.target.resolve()?;
    let content = read_arg(&args.content)?;
    let change = match args.op {
        EditOp::Append => SectionChange::Append(content),
        EditOp::Replace => SectionChange::Replace(content),
    };
    let outcome = match args.expect_hash.as_deref() {
        Some(raw) => {
            let Some(expected) = ContentHash::parse(raw) else {
                bail!("Invalid --expect-hash {raw:?} (expected sha256:<hex> or absent)");
            };
            store
                .edit_expecting(&path, &args.anchor, &change, &expected)
                .await?
        }
        None => store.edit_section(&path, &args.anchor, &change).await?,
    };
    print_json(&outcome)
}

async fn run_overview(store: &SnapshotStore, user_id: &str) -> Result<()> {
    let Some(snapshot) = load_overview_snapshot(store, user_id).await else {
        bail!("Overview for {user_id:?} is unavailable");
    };
    print_json(&OverviewView {
        user_id: user_id.trim().to_string(),
        created: snapshot.created,
        context: format_overview_fragments(&snapshot.fragments),
    })
}

async fn run_part(store: &SnapshotStore, args: PartArgs) -> Result<()> {
    let outcome = match args.event {
        PartEvent::Created {
            user,
            part,
            name,
            status,
            category,
        } => {
            let seed = PartSeed {
                name,
                status,
                category,
                ..PartSeed::placeholder(&user, &part)
            };
            store.on_part_created(&seed).await?
        }
        PartEvent::Updated {
            user,
            part,
            name,
            change,
        } => store.on_part_updated(&user, &part, &name, &change).await?,
    };
    print_json(&outcome)
}

async fn run_parts(parts: PartsRepository, args: PartsArgs) -> Result<()> {
    match args.command {
        PartsCommand::List {
            user,
            query,
            status,
            category,
            tag,
            limit,
        } => {
            let filter = ListPartsFilter {
                query,
                category,
                status,
                tag,
                limit,
            };
            print_json(&parts.list_parts(&user, &filter).await?)
        }
        PartsCommand::Show { user, part } => match parts.read_part(&user, &part).await? {
            Some(found) => print_json(&found),
            None => bail!("Part {part:?} not found for {user:?}"),
        },
        PartsCommand::New {
            user,
            part,
            name,
            status,
            category,
            fields,
        } => {
            let seed = PartSeed {
                name,
                status,
                category,
                ..PartSeed::placeholder(&user, &part)
            };
            print_json(&parts.create_part(&seed, &fields.update()).await?)
        }
        PartsCommand::Set {
            user,
            part,
            name,
            status,
            category,
            fields,
        } => {
            let update = PartFrontmatterUpdate {
                name,
                status,
                category,
                ..fields.update()
            };
            print_json(&parts.update_part_frontmatter(&user, &part, &update).await?)
        }
    }
}

async fn run_enqueue(config: &ResolvedConfig, args: EnqueueArgs) -> Result<()> {
    let raw = read_arg(&args.event)?;
    let event: UpdateEvent =
        serde_json::from_str(&raw).with_context(|| format!("Invalid update event {raw:?}"))?;
    let metadata = match args.metadata.as_deref() {
        Some(raw) => serde_json::from_str(raw).context("Invalid --metadata JSON")?,
        None => serde_json::Value::Null,
    };
    let update = NewUpdate {
        summary: args.summary,
        metadata,
        ..NewUpdate::new(args.user, event)
    };
    let queue = JsonFileUpdateQueue::new(config.queue_path.clone());
    let outcome = queue.enqueue(update).await?;
    print_json(&outcome)
}

async fn run_digest_command(
    store: &SnapshotStore,
    config: &ResolvedConfig,
    args: DigestArgs,
) -> Result<()> {
    let queue = JsonFileUpdateQueue::new(config.queue_path.clone());
    let settings = match args.batch_limit {
        Some(limit) => DigestSettings::with_batch_limit(limit),
        None => config.digest,
    };
    let summarizer = ExtractiveSummarizer;

    let report = match args.user.as_deref() {
        Some(user) => {
            if !queue.has_pending(user).await? {
                log::info!("No pending updates for {user}");
            }
            let result =
                summarize_pending_updates_for_user(store, &queue, &summarizer, user, &settings)
                    .await?;
            DigestRunReport {
                entries: vec![DigestRunEntry::Ok(result)],
            }
        }
        None => run_digest(store, &queue, &summarizer, &settings).await?,
    };

    log::info!(
        "Digest finished: {} users, {} updates, {} errors",
        report.entries.len(),
        report.processed_count(),
        report.error_count()
    );
    print_json(&report)?;
    if args.strict && report.error_count() > 0 {
        bail!("Digest failed for {} users", report.error_count());
    }
    Ok(())
}
