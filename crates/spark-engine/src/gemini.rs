use anyhow::{anyhow, bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Request as HttpRequest, Response as HttpResponse};
use reqwest::header::HeaderValue;
use serde_json::{json, Value};
use spark_contracts::conversation::{AspectRatio, Attachment};

use crate::config::SparkConfig;
use crate::error::truncate_text;
use crate::service::{
    ChatSession, GeneratedImage, GenerativeService, GroundingChunk, TextReply, WebSource,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Generative Language REST API client (Gemini text/vision/search, Imagen and
/// Gemini image models).
pub struct GeminiService {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiService {
    pub fn new(config: &SparkConfig) -> Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set");
        };
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_base: config.api_base.clone(),
            api_key,
            http,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        endpoint_for_model(&self.api_base, model, method)
    }

    /// The key travels in the `x-goog-api-key` header so that transport
    /// errors, which quote the request URL, never carry it.
    fn build_request(&self, endpoint: &str, payload: &Value) -> Result<HttpRequest> {
        let mut key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| anyhow!("API key contains characters not allowed in a header"))?;
        key.set_sensitive(true);
        self.http
            .post(endpoint)
            .header(API_KEY_HEADER, key)
            .json(payload)
            .build()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("failed to build Gemini request ({endpoint})"))
    }

    fn post(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        let request = self.build_request(endpoint, payload)?;
        let response = self
            .http
            .execute(request)
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }

    fn generate_content(&self, model: &str, payload: &Value) -> Result<Value> {
        self.post(&self.endpoint(model, "generateContent"), payload)
    }
}

impl GenerativeService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn create_session(&self, model: &str, system_instruction: &str) -> Result<ChatSession> {
        if model.trim().is_empty() {
            bail!("chat session requires a model");
        }
        Ok(ChatSession::new(model, system_instruction))
    }

    fn send_to_session(&self, session: &mut ChatSession, text: &str) -> Result<TextReply> {
        let response = self.generate_content(&session.model, &session_payload(session, text))?;
        let reply = TextReply {
            text: extract_text(&response),
            grounding_chunks: extract_grounding_chunks(&response),
        };
        session.record_exchange(text, &reply.text);
        Ok(reply)
    }

    fn complete_with_search(&self, model: &str, text: &str) -> Result<TextReply> {
        let response = self.generate_content(model, &search_payload(text))?;
        Ok(TextReply {
            text: extract_text(&response),
            grounding_chunks: extract_grounding_chunks(&response),
        })
    }

    fn complete_vision(&self, model: &str, text: &str, images: &[Attachment]) -> Result<String> {
        let response = self.generate_content(model, &vision_payload(text, images))?;
        Ok(extract_text(&response))
    }

    fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<Option<GeneratedImage>> {
        if is_imagen_model(model) {
            let response = self.post(
                &self.endpoint(model, "predict"),
                &predict_payload(prompt, aspect_ratio),
            )?;
            return Ok(extract_predictions(&response).into_iter().next());
        }
        let response = self.generate_content(model, &image_content_payload(prompt, aspect_ratio))?;
        Ok(extract_inline_images(&response).into_iter().next())
    }
}

fn endpoint_for_model(api_base: &str, model: &str, method: &str) -> String {
    let trimmed = model.trim();
    let model_path = if trimmed.starts_with("models/") {
        trimmed.to_string()
    } else {
        format!("models/{trimmed}")
    };
    format!("{api_base}/{model_path}:{method}")
}

fn is_imagen_model(model: &str) -> bool {
    model
        .trim()
        .trim_start_matches("models/")
        .to_ascii_lowercase()
        .starts_with("imagen")
}

fn user_content(text: &str) -> Value {
    json!({
        "role": "user",
        "parts": [{ "text": text }],
    })
}

fn session_payload(session: &ChatSession, text: &str) -> Value {
    let mut contents: Vec<Value> = session
        .history
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role,
                "parts": [{ "text": turn.text }],
            })
        })
        .collect();
    contents.push(user_content(text));
    let mut payload = json!({ "contents": contents });
    if !session.system_instruction.trim().is_empty() {
        payload["systemInstruction"] = json!({
            "parts": [{ "text": session.system_instruction }],
        });
    }
    payload
}

fn search_payload(text: &str) -> Value {
    json!({
        "contents": [user_content(text)],
        "tools": [{ "google_search": {} }],
    })
}

fn vision_payload(text: &str, images: &[Attachment]) -> Value {
    let mut parts: Vec<Value> = images
        .iter()
        .map(|image| {
            json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.data,
                }
            })
        })
        .collect();
    parts.push(json!({ "text": text }));
    json!({
        "contents": [{
            "role": "user",
            "parts": parts,
        }],
    })
}

fn predict_payload(prompt: &str, aspect_ratio: AspectRatio) -> Value {
    json!({
        "instances": [{ "prompt": prompt }],
        "parameters": {
            "sampleCount": 1,
            "aspectRatio": aspect_ratio.as_str(),
            "outputOptions": { "mimeType": "image/jpeg" },
        },
    })
}

fn image_content_payload(prompt: &str, aspect_ratio: AspectRatio) -> Value {
    json!({
        "contents": [user_content(prompt)],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": { "aspectRatio": aspect_ratio.as_str() },
        },
    })
}

fn candidate_parts(response_payload: &Value) -> Vec<Value> {
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn extract_text(response_payload: &Value) -> String {
    candidate_parts(response_payload)
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("")
        .trim()
        .to_string()
}

fn extract_grounding_chunks(response_payload: &Value) -> Vec<GroundingChunk> {
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("groundingMetadata"))
        .and_then(|metadata| metadata.get("groundingChunks"))
        .and_then(Value::as_array)
        .map(|chunks| {
            chunks
                .iter()
                .map(|chunk| GroundingChunk {
                    web: chunk
                        .get("web")
                        .and_then(Value::as_object)
                        .map(|web| WebSource {
                            title: web.get("title").and_then(Value::as_str).map(str::to_string),
                            uri: web.get("uri").and_then(Value::as_str).map(str::to_string),
                        }),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn extract_inline_images(response_payload: &Value) -> Vec<GeneratedImage> {
    let mut out = Vec::new();
    for part in candidate_parts(response_payload) {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        out.push(GeneratedImage {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        });
    }
    out
}

fn extract_predictions(response_payload: &Value) -> Vec<GeneratedImage> {
    let predictions = response_payload
        .get("predictions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for row in predictions {
        let Some(obj) = row.as_object() else {
            continue;
        };
        let encoded = obj
            .get("bytesBase64Encoded")
            .or_else(|| obj.get("bytes_base64_encoded"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if encoded.is_empty() {
            continue;
        }
        let mime_type = obj
            .get("mimeType")
            .or_else(|| obj.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        out.push(GeneratedImage {
            mime_type: mime_type.to_string(),
            data: encoded.to_string(),
        });
    }
    out
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        return Err(anyhow!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        ));
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}
