//! 语音合成
//!
//! SpeechBackend 返回浮点波形；SpeechSynthesizer 按峰值归一化，编码为单声道 16-bit PCM WAVE，
//! 写到 output_dir/<prefix>_<uuid>.wav。已写出的文件不回滚。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::tools::CapabilityError;

const EMPTY_TEXT: &str = "No hay texto para convertir";

/// 后端返回的原始波形
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Waveform {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Waveform, String>;
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

/// HTTP 后端：POST {base_url}/synthesize
pub struct HttpSpeechBackend {
    client: Client,
    base_url: String,
    voice: String,
}

impl HttpSpeechBackend {
    pub fn new(base_url: &str, voice: &str, timeout_secs: u64) -> Result<Self, CapabilityError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CapabilityError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            voice: voice.to_string(),
        })
    }
}

#[async_trait]
impl SpeechBackend for HttpSpeechBackend {
    async fn synthesize(&self, text: &str) -> Result<Waveform, String> {
        let url = format!("{}/synthesize", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SynthesizeRequest {
                text,
                voice: &self.voice,
            })
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        response.json::<Waveform>().await.map_err(|e| e.to_string())
    }
}

/// 单声道 16-bit PCM WAVE；样本先按峰值归一化，峰值为 0 时输出静音
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let peak = samples
        .iter()
        .filter(|s| s.is_finite())
        .fold(0f32, |m, s| m.max(s.abs()));
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for s in samples {
        let normalized = if peak > 0.0 && s.is_finite() { s / peak } else { 0.0 };
        let pcm = (normalized * i16::MAX as f32).round() as i16;
        out.extend_from_slice(&pcm.to_le_bytes());
    }
    out
}

pub struct SpeechSynthesizer {
    backend: Arc<dyn SpeechBackend>,
    output_dir: PathBuf,
    file_prefix: String,
}

impl SpeechSynthesizer {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        output_dir: impl Into<PathBuf>,
        file_prefix: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
            file_prefix: file_prefix.into(),
        }
    }

    /// 成功返回写出的文件路径
    pub async fn speak(&self, text: &str) -> Result<PathBuf, CapabilityError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CapabilityError::EmptyInput(EMPTY_TEXT));
        }
        self.synthesize_to_file(text).await.map_err(|e| {
            tracing::error!(error = %e, "speech synthesis failed");
            CapabilityError::Backend(format!("Error generando audio: {e}"))
        })
    }

    async fn synthesize_to_file(&self, text: &str) -> Result<PathBuf, String> {
        let waveform = self.backend.synthesize(text).await?;
        if waveform.sample_rate == 0 {
            return Err("invalid sample rate 0".to_string());
        }
        let bytes = encode_wav(&waveform.samples, waveform.sample_rate);
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| e.to_string())?;
        let path = self
            .output_dir
            .join(format!("{}_{}.wav", self.file_prefix, uuid::Uuid::new_v4()));
        tokio::fs::write(&path, bytes).await.map_err(|e| e.to_string())?;
        tracing::info!(path = %path.display(), samples = waveform.samples.len(), "audio written");
        Ok(path)
    }
}
