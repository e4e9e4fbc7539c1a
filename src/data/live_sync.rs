use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::DataLoader;
use crate::backend::{Backend, ChangeFilter, ChangeStream};
use crate::error::BackendError;

/// Reloads the catalog whenever any watched table changes.
///
/// Holds one change subscription for as long as it lives. `stop()` releases it
/// and waits for the listener; dropping without `stop()` aborts the listener,
/// which releases the subscription as the task unwinds.
pub struct LiveSync {
    stop: Option<oneshot::Sender<()>>,
    listener: Option<JoinHandle<()>>,
    reload: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl LiveSync {
    pub async fn start(backend: Arc<dyn Backend>, loader: Arc<DataLoader>) -> Result<Self, BackendError> {
        let stream = backend.subscribe(ChangeFilter::all()).await?;
        let (stop_tx, stop_rx) = oneshot::channel();
        let reload = Arc::new(Mutex::new(None));
        let listener = tokio::spawn(listen(stream, loader, reload.clone(), stop_rx));

        Ok(Self {
            stop: Some(stop_tx),
            listener: Some(listener),
            reload,
        })
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }
        self.cancel_reload();
    }

    fn cancel_reload(&self) {
        if let Some(reload) = self.reload.lock().take() {
            reload.abort();
        }
    }
}

impl Drop for LiveSync {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.cancel_reload();
    }
}

async fn listen(
    mut stream: ChangeStream,
    loader: Arc<DataLoader>,
    reload: Arc<Mutex<Option<JoinHandle<()>>>>,
    mut stop: oneshot::Receiver<()>,
) {
    let stopped = loop {
        tokio::select! {
            _ = &mut stop => break true,
            event = stream.next() => match event {
                Some(event) => {
                    log::info!("Data changed in {:?} ({}), reloading", event.table, event.kind.as_str());
                    if let Some(handle) = loader.trigger() {
                        *reload.lock() = Some(handle);
                    }
                }
                None => break false,
            },
        }
    };

    if stopped {
        stream.unsubscribe();
    } else {
        log::warn!("Change stream ended, live updates stopped");
    }
}
