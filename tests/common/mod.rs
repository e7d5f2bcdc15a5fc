#![allow(dead_code)]

use wiremock::{Request, Respond, ResponseTemplate};

pub fn body(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

/// Serves `bytes=a-b` / `bytes=a-` ranges with 206 + Content-Range, and the
/// whole body with 200 when no Range header is sent.
pub struct RangeResponder {
    pub body: Vec<u8>,
}

impl Respond for RangeResponder {
    fn respond(&self, req: &Request) -> ResponseTemplate {
        let len = self.body.len() as u64;
        let range = req
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("bytes="))
            .and_then(|s| s.split_once('-'));

        let Some((a, b)) = range else {
            return ResponseTemplate::new(200)
                .insert_header("Accept-Ranges", "bytes")
                .set_body_bytes(self.body.clone());
        };
        let start: u64 = a.parse().unwrap_or(0);
        let end: u64 = if b.is_empty() { len - 1 } else { b.parse::<u64>().unwrap_or(len - 1).min(len - 1) };
        if start > end {
            return ResponseTemplate::new(416).insert_header("Content-Range", format!("bytes */{len}").as_str());
        }
        ResponseTemplate::new(206)
            .insert_header("Accept-Ranges", "bytes")
            .insert_header("Content-Range", format!("bytes {start}-{end}/{len}").as_str())
            .set_body_bytes(self.body[start as usize..=end as usize].to_vec())
    }
}
