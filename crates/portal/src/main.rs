//! `courseport-portal` -- console client for the course portal.
//!
//! Restores the persisted session and lock snapshot, keeps lock state in
//! sync with the lock service while signed in, and renders the gated
//! sidebar whenever it changes.
//!
//! # Environment variables
//!
//! | Variable                  | Default                        | Description                      |
//! |---------------------------|--------------------------------|----------------------------------|
//! | `API_BASE_URL`            | `http://localhost:8000/api/v1` | Lock and auth service base URL   |
//! | `STORAGE_DIR`             | `.courseport`                  | Session and lock snapshot files  |
//! | `LOCK_POLL_INTERVAL_SECS` | `5`                            | Seconds between background syncs |
//! | `REQUEST_TIMEOUT_SECS`    | `20`                           | HTTP request timeout             |

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courseport_client::api::{LockApi, LockTransport};
use courseport_client::auth::{AuthProvider, SessionAuth};
use courseport_client::events::LockEvent;
use courseport_client::scheduler::SyncScheduler;
use courseport_client::storage::{FileStorage, KeyValueStorage};
use courseport_client::store::LockStore;
use courseport_core::navigation::{course_tree, validate_tree};

use courseport_portal::config::PortalConfig;
use courseport_portal::console::{Command, Console, Outcome};
use courseport_portal::render::render_sidebar;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courseport_portal=info,courseport_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = PortalConfig::from_env();
    tracing::info!(
        api_base_url = %config.api_base_url,
        storage_dir = %config.storage_dir.display(),
        poll_interval_secs = config.poll_interval.as_secs(),
        "Starting courseport-portal",
    );

    let tree = course_tree();
    validate_tree(&tree)?;

    let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::new(&config.storage_dir));
    let client_config = config.client_config();

    let auth = Arc::new(SessionAuth::new(&client_config, Arc::clone(&storage))?);
    let transport: Arc<dyn LockTransport> = Arc::new(LockApi::new(
        &client_config,
        Arc::clone(&auth) as Arc<dyn AuthProvider>,
    )?);
    let store = Arc::new(LockStore::new(transport, storage));

    let cancel = CancellationToken::new();
    let scheduler = SyncScheduler::new(Arc::clone(&store), config.poll_interval)
        .spawn(auth.subscribe(), cancel.clone());
    // Covers sign-outs the console does not see, such as a failed token refresh.
    let sign_out_reset = store.spawn_reset_on_sign_out(auth.subscribe(), cancel.clone());

    let renderer = tokio::spawn(render_on_change(
        store.subscribe(),
        Arc::clone(&store),
        Arc::clone(&auth),
        tree.clone(),
        cancel.clone(),
    ));

    let console = Console::new(Arc::clone(&auth), store, scheduler, tree);
    match auth.user() {
        Some(user) => println!("Signed in as {} ({})", user.name, user.role),
        None => println!("Not signed in. Use 'login <email> <password>'."),
    }
    print!("{}", console.view().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match console.execute(command).await {
            Ok(Outcome::Continue(output)) => print!("{output}"),
            Ok(Outcome::Quit) => break,
            Err(e) => println!("Error: {e:#}"),
        }
    }

    tracing::info!("Shutting down");
    cancel.cancel();
    console.shutdown().await;
    let _ = renderer.await;
    let _ = sign_out_reset.await;
    Ok(())
}

/// Re-render the sidebar whenever lock state changes.
async fn render_on_change(
    mut events: broadcast::Receiver<LockEvent>,
    store: Arc<LockStore>,
    auth: Arc<SessionAuth>,
    tree: Vec<courseport_core::navigation::ContentItem>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Ok(LockEvent::Failed { message }) => println!("Error: {message}"),
            Ok(LockEvent::Patched { .. }) => {}
            Ok(event) if event.affects_locks() => {
                let cache = store.snapshot().await;
                print!("{}", render_sidebar(&tree, &cache, auth.is_admin()));
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Renderer lagged behind lock events");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
