//! Live-reload signalling.
//!
//! Pipelines only ever talk to a [`LiveReload`] handle: a sender half that
//! queues [`Signal`]s. Whoever owns the receiver (the websocket server in
//! watch mode) forwards them to connected browsers. Sending is fire and
//! forget; a closed channel only means nobody is listening anymore.

use std::sync::mpsc::{Receiver, Sender, channel};

use camino::{Utf8Path, Utf8PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Reload the whole page.
    Reload,
    /// Swap a single stylesheet, given by its URL path.
    Inject(String),
}

impl Signal {
    /// Wire format understood by the client script.
    pub fn to_message(&self) -> String {
        match self {
            Signal::Reload => "reload".to_string(),
            Signal::Inject(href) => format!("css:{href}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveReload {
    /// Directory served at `/`, used to turn file paths into URLs.
    root: Utf8PathBuf,
    tx: Sender<Signal>,
}

impl LiveReload {
    pub fn new(root: impl Into<Utf8PathBuf>, tx: Sender<Signal>) -> Self {
        Self {
            root: root.into(),
            tx,
        }
    }

    pub fn channel(root: impl Into<Utf8PathBuf>) -> (Self, Receiver<Signal>) {
        let (tx, rx) = channel();
        (Self::new(root, tx), rx)
    }

    pub fn reload(&self) {
        self.send(Signal::Reload);
    }

    /// Announces freshly written files. Stylesheets are injected in place,
    /// anything else reloads the page once.
    pub fn changed<P: AsRef<Utf8Path>>(&self, paths: &[P]) {
        let mut reload = false;

        for path in paths {
            let path = path.as_ref();
            match path.extension() {
                Some("css") => match path.strip_prefix(&self.root) {
                    Ok(relative) => self.send(Signal::Inject(format!("/{relative}"))),
                    Err(_) => reload = true,
                },
                // source maps never affect the page
                Some("map") => {}
                _ => reload = true,
            }
        }

        if reload {
            self.reload();
        }
    }

    fn send(&self, signal: Signal) {
        if self.tx.send(signal).is_err() {
            tracing::debug!("live-reload channel closed");
        }
    }
}

/// Browser side of the protocol: reloads the page, or re-fetches the
/// matching stylesheet when only CSS changed.
pub fn script(port: u16) -> String {
    format!(
        r#"(() => {{
    const socket = new WebSocket(`ws://${{location.hostname}}:{port}`);
    socket.addEventListener("message", event => {{
        const data = String(event.data);
        if (!data.startsWith("css:")) {{
            window.location.reload();
            return;
        }}
        const href = data.slice(4);
        let found = false;
        for (const link of document.querySelectorAll('link[rel="stylesheet"]')) {{
            const url = new URL(link.href, window.location.href);
            if (url.pathname === href) {{
                url.searchParams.set("shikake", Date.now());
                link.href = url.toString();
                found = true;
            }}
        }}
        if (!found) window.location.reload();
    }});
}})();
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_styles_inject() {
        let (reload, rx) = LiveReload::channel("/srv/theme");
        reload.changed(&[
            Utf8Path::new("/srv/theme/assets/css/main.css"),
            Utf8Path::new("/srv/theme/assets/css/main.css.map"),
        ]);

        let signals: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            signals,
            vec![Signal::Inject("/assets/css/main.css".into())]
        );
        assert_eq!(signals[0].to_message(), "css:/assets/css/main.css");
    }

    #[test]
    fn test_changed_other_reloads_once() {
        let (reload, rx) = LiveReload::channel("/srv/theme");
        reload.changed(&[
            Utf8Path::new("/srv/theme/assets/images/a.png"),
            Utf8Path::new("/srv/theme/assets/images/b.png"),
        ]);

        let signals: Vec<_> = rx.try_iter().collect();
        assert_eq!(signals, vec![Signal::Reload]);
    }

    #[test]
    fn test_script_port() {
        let script = script(35729);
        assert!(script.contains(":35729`"));
        assert!(script.contains(r#"data.startsWith("css:")"#));
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (reload, rx) = LiveReload::channel("/srv/theme");
        drop(rx);
        reload.reload();
    }
}
