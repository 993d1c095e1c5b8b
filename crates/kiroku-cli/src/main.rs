use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use kiroku_api::hexagon::HexagonClient;
use kiroku_api::trakt::TraktClient;
use kiroku_api::tvdb::TvdbClient;
use kiroku_core::config::AppConfig;
use kiroku_core::models::WatchedFlag;
use kiroku_core::resource::Resource;
use kiroku_core::store::Store;
use kiroku_sync::add_show::{AddItemOutcome, AddShowPipeline};
use kiroku_sync::flag_job::{FlagAction, FlagJob, FlagJobExecutor, FlagScope};
use kiroku_sync::{AlwaysOnline, Connectivity, ForcedOffline};

#[derive(Parser)]
#[command(name = "kiroku", about = "Personal show tracker", version)]
struct Cli {
    /// Treat the network as unreachable; remote legs are skipped and
    /// queued runs abort instead of calling out.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add shows to the local catalog by remote id.
    Add { ids: Vec<i64> },
    /// Remove a show and everything under it.
    Remove { show_id: i64 },
    /// List the local catalog.
    Shows,
    /// Change the watched state of a scope of episodes.
    Watch {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(value_enum)]
        state: WatchState,
    },
    /// Mark a scope of episodes collected (or not).
    Collect {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        remove: bool,
    },
    /// Rate a single episode 1-10.
    Rate { episode_id: i64, rating: i64 },
    /// Full-text search over episodes.
    Search {
        query: String,
        /// Prefix suggestions instead of a full match.
        #[arg(long)]
        suggest: bool,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ScopeArgs {
    #[arg(long)]
    episode: Option<i64>,
    #[arg(long)]
    season: Option<i64>,
    #[arg(long)]
    show: Option<i64>,
}

impl ScopeArgs {
    fn to_scope(&self) -> FlagScope {
        if let Some(episode_id) = self.episode {
            FlagScope::Episode { episode_id }
        } else if let Some(season_id) = self.season {
            FlagScope::Season { season_id }
        } else {
            FlagScope::Show {
                // The group is required, so one of the three is set.
                show_id: self.show.unwrap_or_default(),
            }
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum WatchState {
    Watched,
    Unwatched,
    Skipped,
}

impl From<WatchState> for WatchedFlag {
    fn from(state: WatchState) -> Self {
        match state {
            WatchState::Watched => WatchedFlag::Watched,
            WatchState::Unwatched => WatchedFlag::Unwatched,
            WatchState::Skipped => WatchedFlag::Skipped,
        }
    }
}

struct Services {
    tvdb: TvdbClient,
    trakt: Option<TraktClient>,
    hexagon: Option<HexagonClient>,
}

impl Services {
    fn from_config(config: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let tvdb = TvdbClient::new(config.services.tvdb.api_key.clone());
        let trakt = config.trakt_connected().then(|| {
            TraktClient::new(
                config.services.trakt.client_id.clone(),
                config.services.trakt.access_token.clone(),
            )
        });
        let hexagon = if config.hexagon_connected() {
            Some(HexagonClient::new(
                &config.services.hexagon.base_url,
                config.services.hexagon.auth_token.clone(),
            )?)
        } else {
            None
        };
        Ok(Self {
            tvdb,
            trakt,
            hexagon,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kiroku=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let db_path = AppConfig::ensure_db_path()?;
    tracing::debug!(path = %db_path.display(), "opening store");
    let store = Store::open(&db_path)?;
    let services = Services::from_config(&config)?;
    let connectivity: &dyn Connectivity = if cli.offline {
        &ForcedOffline
    } else {
        &AlwaysOnline
    };

    match cli.command {
        Command::Add { ids } => {
            let pipeline = AddShowPipeline::new(
                &store,
                &services.tvdb,
                services.trakt.as_ref(),
                services.hexagon.as_ref(),
                connectivity,
                config.general.language.clone(),
            );
            let report = pipeline.run(&ids).await?;
            for (show_id, outcome) in &report.results {
                match outcome {
                    AddItemOutcome::Added => println!("{show_id}: added"),
                    AddItemOutcome::AlreadyExists => println!("{show_id}: already in catalog"),
                    AddItemOutcome::InvalidId => println!("{show_id}: invalid id"),
                    AddItemOutcome::DoesNotExist => println!("{show_id}: no such show"),
                    AddItemOutcome::MetadataError(msg)
                    | AddItemOutcome::CloudError(msg)
                    | AddItemOutcome::StorageError(msg) => println!("{show_id}: failed: {msg}"),
                }
            }
            if let Some(reason) = report.aborted {
                println!("run aborted: {reason:?}");
            }
        }
        Command::Remove { show_id } => {
            if store.remove_show(show_id)? {
                println!("{show_id}: removed");
            } else {
                println!("{show_id}: not in catalog");
            }
        }
        Command::Shows => {
            let rows = store.query_map(
                &Resource::Shows,
                &["show_id", "title", "status"],
                None,
                &[],
                Some("title"),
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )?;
            for (show_id, title, status) in rows {
                println!("{show_id}\t{title}\t{}", status.as_deref().unwrap_or("-"));
            }
        }
        Command::Watch { scope, state } => {
            let job = FlagJob::new(scope.to_scope(), FlagAction::Watch(state.into()));
            run_job(&store, &services, connectivity, &job).await?;
        }
        Command::Collect { scope, remove } => {
            let job = FlagJob::new(scope.to_scope(), FlagAction::Collect(!remove));
            run_job(&store, &services, connectivity, &job).await?;
        }
        Command::Rate { episode_id, rating } => {
            let job = FlagJob::rate(FlagScope::Episode { episode_id }, rating)?;
            run_job(&store, &services, connectivity, &job).await?;
        }
        Command::Search { query, suggest } => {
            let hits = if suggest {
                store.suggest_episodes(&query)?
            } else {
                store.search_episodes(&query)?
            };
            for hit in hits {
                println!("{}\t{}: {}", hit.episode_id, hit.show_title, hit.title);
            }
        }
    }
    Ok(())
}

async fn run_job(
    store: &Store,
    services: &Services,
    connectivity: &dyn Connectivity,
    job: &FlagJob,
) -> Result<(), Box<dyn std::error::Error>> {
    let executor = FlagJobExecutor::new(
        store,
        services.trakt.as_ref(),
        services.hexagon.as_ref(),
        connectivity,
    );
    let outcome = executor.execute(job).await?;
    println!("{} episode(s) updated", outcome.rows_affected);
    for remote in outcome.remotes {
        match remote.result {
            Ok(()) => println!("{:?}: mirrored", remote.backend),
            Err(e) => println!("{:?}: failed: {e}", remote.backend),
        }
    }
    Ok(())
}
