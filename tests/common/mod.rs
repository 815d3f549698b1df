#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use gif_dropzone::services::conversion::{
    ConversionService, PLACEHOLDER_GIF, ProgressCallback, ServiceError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load,
    Write(String, usize),
    Read(String),
    Run(Vec<String>),
}

/// What the scripted service should get wrong.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub fail_load: bool,
    /// Zero-based index of the `run` call that fails.
    pub fail_run: Option<usize>,
    /// Run commands succeed but never produce their output file.
    pub skip_outputs: bool,
}

type Observer = Box<dyn Fn() -> Option<u8> + Send + Sync>;

/// Conversion service double that records every call and reports a fixed
/// sequence of progress ratios per command.
pub struct RecordingService {
    pub calls: Mutex<Vec<Call>>,
    files: Mutex<HashMap<String, Bytes>>,
    progress: Mutex<Option<ProgressCallback>>,
    ticks: Vec<f64>,
    faults: Faults,
    load_delay: Duration,
    run_delay: Duration,
    observer: Mutex<Option<Observer>>,
    /// Progress seen by the observer after every tick.
    pub observed: Mutex<Vec<Option<u8>>>,
}

impl RecordingService {
    pub fn new() -> Self {
        Self::with_faults(Faults::default())
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            progress: Mutex::new(None),
            ticks: vec![0.0, 0.1, 0.25, 0.5, 0.75, 0.99, 1.0],
            faults,
            load_delay: Duration::ZERO,
            run_delay: Duration::ZERO,
            observer: Mutex::new(None),
            observed: Mutex::new(Vec::new()),
        }
    }

    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }

    pub fn observe(&self, observer: impl Fn() -> Option<u8> + Send + Sync + 'static) {
        *self.observer.lock().unwrap() = Some(Box::new(observer));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn run_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Run(_)))
            .count()
    }

    fn tick(&self, ratio: f64) {
        let callback = self.progress.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(ratio);
        }
        if let Some(observer) = self.observer.lock().unwrap().as_ref() {
            let value = observer();
            self.observed.lock().unwrap().push(value);
        }
    }
}

#[async_trait]
impl ConversionService for RecordingService {
    async fn load(&self) -> Result<(), ServiceError> {
        self.calls.lock().unwrap().push(Call::Load);
        tokio::time::sleep(self.load_delay).await;
        if self.faults.fail_load {
            return Err(ServiceError::Load("core assets unavailable".to_string()));
        }
        Ok(())
    }

    async fn write_working_file(&self, name: &str, data: Bytes) -> Result<(), ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Write(name.to_string(), data.len()));
        self.files.lock().unwrap().insert(name.to_string(), data);
        Ok(())
    }

    async fn read_working_file(&self, name: &str) -> Result<Bytes, ServiceError> {
        self.calls.lock().unwrap().push(Call::Read(name.to_string()));
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::MissingFile(name.to_string()))
    }

    async fn run(&self, args: &[String]) -> Result<(), ServiceError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::Run(args.to_vec()));
            calls.iter().filter(|c| matches!(c, Call::Run(_))).count() - 1
        };
        tokio::time::sleep(self.run_delay).await;

        if self.faults.fail_run == Some(index) {
            self.tick(0.3);
            return Err(ServiceError::Command("Invalid data found when processing input".to_string()));
        }
        for ratio in self.ticks.clone() {
            self.tick(ratio);
        }
        if !self.faults.skip_outputs {
            let output = args.last().cloned().unwrap_or_default();
            self.files
                .lock()
                .unwrap()
                .insert(output, Bytes::from_static(PLACEHOLDER_GIF));
        }
        Ok(())
    }

    fn set_progress(&self, callback: ProgressCallback) {
        *self.progress.lock().unwrap() = Some(callback);
    }
}

pub fn video(name: &str) -> gif_dropzone::FileEntry {
    gif_dropzone::FileEntry::new(name, vec![0u8; 64])
}

pub fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
