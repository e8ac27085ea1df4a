#![allow(dead_code)]

use async_trait::async_trait;
use pdf_rag::embedding::EmbeddingProvider;
use pdf_rag::error::Result;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const HASH_DIMS: usize = 256;

/// Bag-of-words embedder: each lowercase word is hashed into one of
/// `HASH_DIMS` buckets. Deterministic and needs no model download.
pub struct HashEmbedder;

fn fnv1a(word: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; HASH_DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        v[(fnv1a(&word) % HASH_DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }
    fn dims(&self) -> usize {
        HASH_DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

/// Deterministic filler prose of exactly `len` characters.
pub fn filler(len: usize, seed: usize) -> String {
    let words = [
        "river", "stone", "maple", "cloud", "harbor", "lantern", "meadow", "copper",
    ];
    let mut out = String::new();
    let mut i = seed;
    while out.len() < len {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(words[i % words.len()]);
        i += 1;
    }
    out.truncate(len);
    if out.ends_with(' ') {
        out.pop();
        out.push('s');
    }
    out
}

/// Minimal PDF with one page per entry; each page shows its lines in
/// Helvetica. Lines must not contain parentheses or backslashes.
pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let page_count = pages.len();
    // 1 catalog, 2 page tree, 3 font, then (page, content) pairs.
    let page_obj = |i: usize| 4 + 2 * i;
    let content_obj = |i: usize| 5 + 2 * i;
    let total_objects = 3 + 2 * page_count;

    let mut out = Vec::new();
    let mut offsets = Vec::with_capacity(total_objects);
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", page_obj(i)))
        .collect();
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids.join(" "),
            page_count
        )
        .as_bytes(),
    );

    offsets.push(out.len());
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >> endobj\n",
    );

    for (i, lines) in pages.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_obj(i),
                content_obj(i)
            )
            .as_bytes(),
        );

        let mut stream = String::from("BT /F1 12 Tf 72 720 Td");
        for (n, line) in lines.iter().enumerate() {
            if n > 0 {
                stream.push_str(" 0 -16 Td");
            }
            stream.push_str(&format!(" ({}) Tj", line));
        }
        stream.push_str(" ET");

        offsets.push(out.len());
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
                content_obj(i),
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", total_objects + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            total_objects + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

/// `/api/tags` listing the given model names.
pub async fn mount_tags(server: &MockServer, names: &[&str]) {
    let models: Vec<serde_json::Value> = names
        .iter()
        .map(|n| serde_json::json!({ "name": n, "size": 1000 }))
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": models
        })))
        .mount(server)
        .await;
}

/// Successful `/api/pull` stream.
pub fn pull_success_body() -> String {
    [
        r#"{"status":"pulling manifest"}"#,
        r#"{"status":"pulling 8934d96d3f08","digest":"sha256:8934d96d3f08","total":3826793677,"completed":1000}"#,
        r#"{"status":"verifying sha256 digest"}"#,
        r#"{"status":"writing manifest"}"#,
        r#"{"status":"success"}"#,
    ]
    .join("\n")
        + "\n"
}
