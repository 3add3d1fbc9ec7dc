//! Background fetches delivered on the owning thread
//!
//! Loads run on worker threads; their results wait in a channel until the
//! owner calls [`ResourceFetcher::poll`], which runs the completion
//! callbacks. Callbacks never run on a worker.

use super::loader::WebLoader;
use crate::utils::error::{Result, WebError};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

pub type FetchCallback = Box<dyn FnOnce(Result<String>)>;

type Completion = (u64, Result<String>);

pub struct ResourceFetcher {
    loader: WebLoader,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    callbacks: HashMap<u64, FetchCallback>,
    next_id: u64,
}

impl ResourceFetcher {
    pub fn new(loader: WebLoader) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            loader,
            sender,
            receiver,
            callbacks: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn loader(&self) -> &WebLoader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut WebLoader {
        &mut self.loader
    }

    /// Start loading `reference`; `on_complete` runs from a later
    /// [`poll`](Self::poll). Returns the request id.
    pub fn fetch<F>(&mut self, reference: &str, on_complete: F) -> u64
    where
        F: FnOnce(Result<String>) + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.callbacks.insert(id, Box::new(on_complete));

        let loader = self.loader.clone();
        let sender = self.sender.clone();
        let reference = reference.to_string();
        let spawned = thread::Builder::new()
            .name(format!("webhost-fetch-{id}"))
            .spawn(move || {
                let result = loader.load_text(&reference);
                if let Err(err) = &result {
                    log::warn!("fetch of {reference} failed: {err}");
                }
                // The receiver is gone only when the fetcher was dropped.
                let _ = sender.send((id, result));
            });

        if let Err(err) = spawned {
            log::error!("cannot start fetch worker: {err}");
            let _ = self.sender.send((id, Err(WebError::Io(err))));
        }
        id
    }

    /// Deliver finished fetches. Returns how many callbacks ran.
    pub fn poll(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok((id, result)) = self.receiver.try_recv() {
            if let Some(callback) = self.callbacks.remove(&id) {
                callback(result);
                delivered += 1;
            }
        }
        delivered
    }

    /// Requests whose callback has not run yet
    pub fn pending(&self) -> usize {
        self.callbacks.len()
    }
}
