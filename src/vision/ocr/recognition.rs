// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Text recognition capability
//!
//! [`TextRecognizer`] turns one cropped text region into a string. It never
//! fails from the caller's point of view: an implementation that cannot
//! read a crop returns an empty string. [`OnnxTextRecognizer`] implements it
//! with a CTC model over a character dictionary.

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::{s, Array4, ArrayView2, ArrayViewD, Axis, Ix2, Ix3};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::preprocessing::{preprocess_for_recognition, REC_INPUT_HEIGHT};

/// Reads text from cropped regions
///
/// Implementations are shared read-only across concurrent requests.
#[cfg_attr(test, mockall::automock)]
pub trait TextRecognizer: Send + Sync {
    /// Text in `crop`, or `""` when it cannot be read
    fn recognize(&self, crop: &DynamicImage) -> String;

    /// One string per crop, in order
    fn recognize_batch(&self, crops: &[DynamicImage]) -> Vec<String> {
        crops.iter().map(|crop| self.recognize(crop)).collect()
    }
}

/// Fix-ups for common recognizer confusions
///
/// Trims surrounding whitespace, then maps `|` to `I`, `[` to `(` and `]`
/// to `)`.
pub fn clean_text(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '|' => 'I',
            '[' => '(',
            ']' => ')',
            other => other,
        })
        .collect()
}

/// ONNX CTC text recognizer
///
/// Runs on CPU. The session is loaded once and reused; `Clone` shares it.
#[derive(Clone)]
pub struct OnnxTextRecognizer {
    session: Arc<Mutex<Session>>,
    /// Index 0 is the CTC blank
    dictionary: Arc<Vec<char>>,
    input_name: String,
}

impl std::fmt::Debug for OnnxTextRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxTextRecognizer")
            .field("dictionary_size", &self.dictionary.len())
            .field("input_name", &self.input_name)
            .finish_non_exhaustive()
    }
}

impl OnnxTextRecognizer {
    /// Load the recognition model and its character dictionary
    ///
    /// # Errors
    /// Returns error if either file is missing, the dictionary cannot be
    /// read, or ONNX Runtime cannot build a session.
    pub fn new<P: AsRef<Path>, D: AsRef<Path>>(
        model_path: P,
        dict_path: D,
        intra_threads: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let dict_path = dict_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("Text recognition model not found: {}", model_path.display());
        }
        if !dict_path.exists() {
            anyhow::bail!("Character dictionary not found: {}", dict_path.display());
        }

        info!("Loading text recognition model from {}", model_path.display());

        let dictionary = load_dictionary(dict_path)?;
        info!(
            "Loaded character dictionary with {} characters",
            dictionary.len()
        );

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(intra_threads)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load text recognition model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "x".to_string());

        debug!("Recognition model loaded - input: {}", input_name);

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            dictionary: Arc::new(dictionary),
            input_name,
        })
    }

    pub fn dictionary_size(&self) -> usize {
        self.dictionary.len()
    }

    /// Run the model on a `[N, 3, 48, W]` batch and decode every row
    fn run(&self, input: Array4<f32>) -> Result<Vec<String>> {
        let batch = input.shape()[0];
        let input_value = Value::from_array(input).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Recognition session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Recognition inference failed")?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        decode_output(output, batch, &self.dictionary)
    }
}

impl TextRecognizer for OnnxTextRecognizer {
    fn recognize(&self, crop: &DynamicImage) -> String {
        match self.run(preprocess_for_recognition(crop)) {
            Ok(mut texts) => texts.pop().unwrap_or_default(),
            Err(e) => {
                warn!("Text recognition failed: {:#}", e);
                String::new()
            }
        }
    }

    /// Runs every crop through the model in one call, zero-padding to the
    /// widest crop
    fn recognize_batch(&self, crops: &[DynamicImage]) -> Vec<String> {
        if crops.is_empty() {
            return Vec::new();
        }

        let tensors: Vec<Array4<f32>> = crops.iter().map(preprocess_for_recognition).collect();
        let max_width = tensors.iter().map(|t| t.shape()[3]).max().unwrap_or(0);

        let mut input = Array4::zeros((
            tensors.len(),
            3,
            REC_INPUT_HEIGHT as usize,
            max_width,
        ));
        for (i, tensor) in tensors.iter().enumerate() {
            let width = tensor.shape()[3];
            input
                .slice_mut(s![i..i + 1, .., .., ..width])
                .assign(tensor);
        }

        match self.run(input) {
            Ok(texts) => texts,
            Err(e) => {
                warn!("Batched text recognition failed for {} crops: {:#}", crops.len(), e);
                vec![String::new(); crops.len()]
            }
        }
    }
}

/// Load a character dictionary, one character per line
///
/// A blank is inserted at index 0 for CTC and a space is appended when the
/// file does not contain one.
pub fn load_dictionary<P: AsRef<Path>>(path: P) -> Result<Vec<char>> {
    let file = File::open(path.as_ref()).context(format!(
        "Failed to open dictionary: {}",
        path.as_ref().display()
    ))?;

    let reader = BufReader::new(file);
    let mut dictionary = vec!['\0'];

    for line in reader.lines() {
        let line = line.context("Failed to read dictionary line")?;
        if let Some(ch) = line.chars().next() {
            dictionary.push(ch);
        }
    }

    if dictionary.len() == 1 {
        anyhow::bail!("Dictionary {} is empty", path.as_ref().display());
    }

    if !dictionary[1..].contains(&' ') {
        dictionary.push(' ');
    }

    Ok(dictionary)
}

/// Split a `[N, T, C]` (or `[T, C]` for N = 1) output into decoded strings
fn decode_output(output: ArrayViewD<f32>, batch: usize, dictionary: &[char]) -> Result<Vec<String>> {
    match output.ndim() {
        3 => {
            let output = output.into_dimensionality::<Ix3>()?;
            if output.shape()[0] != batch {
                anyhow::bail!(
                    "Recognition output batch {} does not match input batch {}",
                    output.shape()[0],
                    batch
                );
            }
            Ok(output
                .axis_iter(Axis(0))
                .map(|row| ctc_decode(row, dictionary))
                .collect())
        }
        2 if batch == 1 => {
            let output = output.into_dimensionality::<Ix2>()?;
            Ok(vec![ctc_decode(output, dictionary)])
        }
        _ => anyhow::bail!("Unexpected recognition output shape: {:?}", output.shape()),
    }
}

/// Greedy CTC decoding: best class per timestep, collapse repeats, drop
/// blanks (index 0)
pub fn ctc_decode(output: ArrayView2<f32>, dictionary: &[char]) -> String {
    let mut text = String::new();
    let mut prev_index: Option<usize> = None;

    for timestep in output.axis_iter(Axis(0)) {
        let best = timestep
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);

        if best != 0 && Some(best) != prev_index {
            if let Some(&ch) = dictionary.get(best) {
                text.push(ch);
            }
        }

        prev_index = if best == 0 { None } else { Some(best) };
    }

    text
}
