//! 图形验证码
//!
//! 验证码只能校验一次：无论答案对错，校验后立即作废。

use adm_error::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::fmt::Write as _;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::config::CaptchaConfig;

#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: String,
    /// `data:image/svg+xml;base64,...`
    pub image: String,
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn issue(&self) -> Result<Challenge>;
    /// 校验并作废
    async fn verify(&self, id: &str, answer: &str) -> Result<bool>;
}

struct Entry {
    answer: String,
    expires_at: DateTime<Utc>,
}

pub struct MemoryChallengeStore {
    config: CaptchaConfig,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryChallengeStore {
    pub fn new(config: CaptchaConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn random_answer(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.config.length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    /// 以指定答案签发，便于测试
    pub async fn issue_with_answer(&self, answer: &str) -> Challenge {
        let now = Utc::now();
        let id = Uuid::new_v4().simple().to_string();
        let image = render_svg(answer, self.config.width, self.config.height);

        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            id.clone(),
            Entry {
                answer: answer.to_string(),
                expires_at: now + Duration::seconds(self.config.ttl_secs as i64),
            },
        );
        debug!(captcha_id = %id, pending = entries.len(), "captcha issued");

        Challenge { id, image }
    }

    pub async fn pending(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn issue(&self) -> Result<Challenge> {
        let answer = self.random_answer();
        Ok(self.issue_with_answer(&answer).await)
    }

    async fn verify(&self, id: &str, answer: &str) -> Result<bool> {
        let entry = self.entries.lock().await.remove(id);
        let Some(entry) = entry else {
            return Ok(false);
        };
        if entry.expires_at <= Utc::now() {
            return Ok(false);
        }
        Ok(entry.answer.eq_ignore_ascii_case(answer.trim()))
    }
}

fn render_svg(answer: &str, width: u32, height: u32) -> String {
    let mut rng = rand::thread_rng();
    let mut svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="100%" height="100%" fill="#f4f6f8"/>"##,
        w = width,
        h = height
    );

    // 干扰线
    for _ in 0..4 {
        let _ = write!(
            svg,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="rgb({},{},{})" stroke-width="1"/>"#,
            rng.gen_range(0..width),
            rng.gen_range(0..height),
            rng.gen_range(0..width),
            rng.gen_range(0..height),
            rng.gen_range(100..200),
            rng.gen_range(100..200),
            rng.gen_range(100..200),
        );
    }

    let count = answer.chars().count().max(1) as u32;
    let step = width / (count + 1);
    let font_size = height * 3 / 4;
    for (i, ch) in answer.chars().enumerate() {
        let x = step * (i as u32 + 1);
        let y = height * 3 / 4 + rng.gen_range(0..=height / 8);
        let rotate: i32 = rng.gen_range(-25..=25);
        let _ = write!(
            svg,
            r#"<text x="{x}" y="{y}" font-size="{font_size}" font-family="monospace" text-anchor="middle" fill="rgb({},{},{})" transform="rotate({rotate} {x} {y})">{ch}</text>"#,
            rng.gen_range(20..90),
            rng.gen_range(20..90),
            rng.gen_range(20..90),
        );
    }
    svg.push_str("</svg>");

    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}
