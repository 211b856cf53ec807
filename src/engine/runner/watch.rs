//! Watch mode is implemented as a three-part system:
//!
//! 1. **File watcher**: Uses the `notify` crate to monitor the roots of all
//!    watched globs recursively. Events are debounced so that a burst of
//!    saves triggers a single run.
//! 2. **WebSocket server**: Spawns a dedicated thread using `tungstenite`
//!    to maintain persistent connections with open browser tabs.
//! 3. **Client script**: Served by the HTTP server, connects to the
//!    WebSocket server and either reloads the page or swaps a stylesheet.
//!
//! ## The Loop
//!
//! When a file change is detected:
//! 1. Every [`WatchRule`] whose file set contains a changed path
//!    contributes its tasks, which are run together.
//! 2. Pipelines signal written files through the environment's
//!    [`LiveReload`] handle while they run.
//! 3. Reload-only rules (templates, PHP files) ask for a full reload.

use std::collections::HashSet;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use camino::Utf8PathBuf;
use notify::RecursiveMode;
use notify_debouncer_full::new_debouncer;
use tungstenite::WebSocket;

use crate::engine::WatchRule;
use crate::error::WatchError;
use crate::reload::{LiveReload, Signal};
use crate::{Environment, TaskGraph};

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

pub(crate) fn watch(
    graph: &TaskGraph,
    env: &Environment,
    rules: &[WatchRule],
) -> Result<(), WatchError> {
    let (tcp, port) = reserve_port(env.config.server.reload_port)?;
    let root = env.locate(env.paths.project_root());

    let clients: Clients = Arc::new(Mutex::new(vec![]));
    let _thread_i = new_thread_ws_incoming(tcp, clients.clone());

    let (reload, signals) = LiveReload::channel(root.clone());
    let _thread_o = new_thread_ws_reload(signals, clients);
    let env = env.clone().with_reload(reload.clone());

    #[cfg(feature = "server")]
    let _thread_http = super::http::start(root.clone(), env.config.server.port, port);

    #[cfg(not(feature = "server"))]
    tracing::info!(port, "live-reload socket ready");

    let (tx, rx) = std::sync::mpsc::channel();
    let debounce = Duration::from_millis(env.config.watch.debounce_ms);
    let mut debouncer = new_debouncer(debounce, None, tx)?;

    let mut watched = HashSet::new();
    for rule in rules {
        for path in rule.sources.roots() {
            if path.is_dir() {
                watched.insert(path.to_path_buf());
            } else {
                tracing::warn!("not watching missing directory {}", path);
            }
        }
    }

    // Collapse watched paths to reduce the number of watches
    for path in collapse_watch_paths(watched) {
        tracing::info!("watching {}", path);
        debouncer.watch(&path, RecursiveMode::Recursive)?;
    }

    loop {
        match rx.recv()? {
            Ok(events) => {
                let paths: Vec<Utf8PathBuf> = events
                    .iter()
                    .flat_map(|de| de.event.paths.iter())
                    .filter_map(|path| Utf8PathBuf::try_from(path.clone()).ok())
                    .collect();

                let (tasks, full_reload) = dispatch(rules, &paths);

                if !tasks.is_empty() {
                    tracing::info!("change detected, running {}", tasks.join(", "));
                    let names: Vec<&str> = tasks.iter().map(String::as_str).collect();

                    match graph.run_all(&env, &names) {
                        Ok(report) if report.is_success() => {
                            tracing::info!("rebuild complete, watching for changes...")
                        }
                        Ok(report) => {
                            for (task, err) in &report.failures {
                                tracing::error!(task = %task, "{err:#}");
                            }
                        }
                        Err(e) => tracing::error!("Error running tasks: {}", e),
                    }
                }

                if full_reload {
                    reload.reload();
                }
            }
            Err(errors) => {
                for e in errors {
                    tracing::error!("watch error: {:?}", e);
                }
            }
        }
    }
}

/// Picks the tasks to run for a batch of changed paths, in rule order, and
/// whether any path only needs a full reload.
fn dispatch(rules: &[WatchRule], paths: &[Utf8PathBuf]) -> (Vec<String>, bool) {
    let mut tasks: Vec<String> = Vec::new();
    let mut reload = false;

    for rule in rules {
        if !paths.iter().any(|path| rule.sources.contains(path)) {
            continue;
        }

        if rule.tasks.is_empty() {
            reload = true;
        }

        for task in &rule.tasks {
            if !tasks.contains(task) {
                tasks.push(task.clone());
            }
        }
    }

    (tasks, reload)
}

fn reserve_port(preferred: u16) -> std::io::Result<(TcpListener, u16)> {
    let listener = match TcpListener::bind(("127.0.0.1", preferred)) {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind("127.0.0.1:0")?,
    };

    let addr = listener.local_addr()?;
    let port = addr.port();
    Ok((listener, port))
}

fn new_thread_ws_incoming(server: TcpListener, clients: Clients) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming() {
            let Ok(stream) = stream else {
                continue;
            };

            let socket = match tungstenite::accept(stream) {
                Ok(socket) => socket,
                Err(e) => {
                    tracing::debug!("rejected live-reload client: {e}");
                    continue;
                }
            };

            if let Ok(mut clients) = clients.lock() {
                clients.push(socket);
            }
        }
    })
}

fn new_thread_ws_reload(signals: Receiver<Signal>, clients: Clients) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(signal) = signals.recv() {
            let Ok(mut clients) = clients.lock() else {
                break;
            };
            let message = signal.to_message();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send(message.as_str().into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(e)) => {
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(
                        tungstenite::error::Error::ConnectionClosed
                        | tungstenite::error::Error::AlreadyClosed,
                    ) => broken.push(i),
                    Err(e) => {
                        tracing::error!("Error: {e:?}");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            // Close all but the last 10 connections
            let len = clients.len();
            if len > 10 {
                for mut socket in clients.drain(0..len - 10) {
                    socket.close(None).ok();
                }
            }
        }
    })
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive. This function sorts the paths and filters
/// out any path that is a subdirectory of a previously accepted path.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered: Vec<Utf8PathBuf> = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileSet;

    fn rules() -> Vec<WatchRule> {
        vec![
            WatchRule::new(
                FileSet::new(["/p/src/styles/**/*.scss"]).unwrap(),
                &["styles:sass"],
            ),
            WatchRule::new(
                FileSet::new(["/p/src/styles/**/*.css", "!/p/src/styles/**/*.min.css"]).unwrap(),
                &["styles:postcss"],
            ),
            WatchRule::new(FileSet::new(["/p/src/scripts/**/*.js"]).unwrap(), &["scripts"]),
            WatchRule::reload(FileSet::new(["/p/**/*.php"]).unwrap()),
        ]
    }

    #[test]
    fn test_dispatch() {
        let paths = vec![
            Utf8PathBuf::from("/p/src/scripts/app.js"),
            Utf8PathBuf::from("/p/src/styles/main.scss"),
            Utf8PathBuf::from("/p/src/styles/vendor.min.css"),
        ];

        let (tasks, reload) = dispatch(&rules(), &paths);
        assert_eq!(tasks, vec!["styles:sass", "scripts"]);
        assert!(!reload);
    }

    #[test]
    fn test_dispatch_reload_only() {
        let paths = vec![Utf8PathBuf::from("/p/templates/header.php")];

        let (tasks, reload) = dispatch(&rules(), &paths);
        assert!(tasks.is_empty());
        assert!(reload);
    }

    #[test]
    fn test_collapse_watch_paths() {
        let mut paths = HashSet::new();
        paths.insert(Utf8PathBuf::from("/a"));
        paths.insert(Utf8PathBuf::from("/a/b"));
        paths.insert(Utf8PathBuf::from("/a/b/c"));
        paths.insert(Utf8PathBuf::from("/b"));
        paths.insert(Utf8PathBuf::from("/c/d"));

        let collapsed = collapse_watch_paths(paths);

        // /a/b and /a/b/c are covered by /a.
        assert_eq!(
            collapsed,
            vec![
                Utf8PathBuf::from("/a"),
                Utf8PathBuf::from("/b"),
                Utf8PathBuf::from("/c/d")
            ]
        );
    }

    #[test]
    fn test_collapse_watch_paths_similar_names() {
        let mut paths = HashSet::new();
        paths.insert(Utf8PathBuf::from("/foo"));
        paths.insert(Utf8PathBuf::from("/foo-bar"));

        let collapsed = collapse_watch_paths(paths);

        // /foo-bar is not a subdirectory of /foo
        assert_eq!(
            collapsed,
            vec![Utf8PathBuf::from("/foo"), Utf8PathBuf::from("/foo-bar")]
        );
    }
}
