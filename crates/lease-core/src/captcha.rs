use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use uuid::Uuid;

use crate::traits::CaptchaProvider;

struct Entry {
    answer: i64,
    expires_at: DateTime<Utc>,
}

/// In-memory `CaptchaProvider`: a short math problem, one-time-use, pruned
/// by expiry on every verify call. Image rendering stays out of scope; the
/// challenge string returned by `issue` is the human-readable problem.
pub struct InMemoryCaptchaProvider {
    cache: DashMap<String, Entry>,
    ttl: chrono::Duration,
}

impl InMemoryCaptchaProvider {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            cache: DashMap::new(),
            ttl,
        }
    }

    fn prune(&self) {
        let now = Utc::now();
        self.cache.retain(|_, entry| entry.expires_at >= now);
    }
}

#[async_trait]
impl CaptchaProvider for InMemoryCaptchaProvider {
    async fn issue(&self) -> (String, String) {
        self.prune();

        let mut rng = rand::thread_rng();
        let a = rng.gen_range(1..=10_i64);
        let b = rng.gen_range(1..=10_i64);
        let (problem, answer) = match rng.gen_range(0..3) {
            0 => (format!("{a} + {b}"), a + b),
            1 => {
                let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
                (format!("{hi} - {lo}"), hi - lo)
            }
            _ => (format!("{a} * {b}"), a * b),
        };

        let id = Uuid::new_v4().to_string();
        self.cache.insert(
            id.clone(),
            Entry {
                answer,
                expires_at: Utc::now() + self.ttl,
            },
        );
        (id, problem)
    }

    async fn verify(&self, id: &str, answer: &str) -> bool {
        self.prune();

        let Some((_, entry)) = self.cache.remove(id) else {
            return false;
        };
        if entry.expires_at < Utc::now() {
            return false;
        }
        answer.trim().parse::<i64>().map(|n| n == entry.answer).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_challenge_verifies_once() {
        let provider = InMemoryCaptchaProvider::new(chrono::Duration::seconds(60));
        let (id, problem) = provider.issue().await;
        let answer = eval_problem(&problem);

        assert!(provider.verify(&id, &answer.to_string()).await);
        // one-time use: second verify with the same id fails
        assert!(!provider.verify(&id, &answer.to_string()).await);
    }

    #[tokio::test]
    async fn expired_challenge_fails() {
        let provider = InMemoryCaptchaProvider::new(chrono::Duration::seconds(-1));
        let (id, problem) = provider.issue().await;
        let answer = eval_problem(&problem);
        assert!(!provider.verify(&id, &answer.to_string()).await);
    }

    #[tokio::test]
    async fn wrong_answer_fails() {
        let provider = InMemoryCaptchaProvider::new(chrono::Duration::seconds(60));
        let (id, _problem) = provider.issue().await;
        assert!(!provider.verify(&id, "not a number").await);
    }

    fn eval_problem(problem: &str) -> i64 {
        let parts: Vec<&str> = problem.split_whitespace().collect();
        let a: i64 = parts[0].parse().unwrap();
        let b: i64 = parts[2].parse().unwrap();
        match parts[1] {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            _ => unreachable!(),
        }
    }
}
