//! Server-side arithmetic challenges gating faucet requests.
//!
//! The answer to a challenge never leaves the server. Each challenge can be redeemed once and
//! expires after the configured TTL.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CaptchaConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationProof {
    pub challenge_id: String,
    pub answer: i64,
}

#[async_trait]
pub trait HumanVerifier: Send + Sync {
    async fn verify(&self, proof: &VerificationProof) -> bool;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    pub question: String,
    pub expires_in_seconds: u64,
}

pub struct ChallengeIssuer {
    outstanding: Cache<String, i64>,
    ttl: Duration,
}

impl ChallengeIssuer {
    pub fn new(config: &CaptchaConfig) -> Self {
        let ttl = config.challenge_ttl();
        assert!(ttl >= Duration::from_secs(1), "Challenge TTL too short");
        let outstanding = Cache::builder()
            .max_capacity(config.max_outstanding)
            .time_to_live(ttl)
            .build();
        Self { outstanding, ttl }
    }

    pub async fn issue(&self) -> Challenge {
        let (id, question, answer) = {
            let mut rng = rand::thread_rng();
            let (question, answer) = arithmetic_challenge(&mut rng);
            let id: [u8; 16] = rng.r#gen();
            (hex::encode(id), question, answer)
        };
        self.outstanding.insert(id.clone(), answer).await;
        debug!("Issued challenge {id}");
        Challenge {
            id,
            question,
            expires_in_seconds: self.ttl.as_secs(),
        }
    }

    pub fn outstanding(&self) -> u64 {
        self.outstanding.entry_count()
    }
}

#[async_trait]
impl HumanVerifier for ChallengeIssuer {
    async fn verify(&self, proof: &VerificationProof) -> bool {
        match self.outstanding.remove(&proof.challenge_id).await {
            Some(expected) => expected == proof.answer,
            None => {
                debug!("Unknown or expired challenge {}", proof.challenge_id);
                false
            }
        }
    }
}

fn arithmetic_challenge<R: Rng + ?Sized>(rng: &mut R) -> (String, i64) {
    match rng.gen_range(0..3) {
        0 => {
            let (a, b) = (rng.gen_range(1..=50), rng.gen_range(1..=50));
            (format!("{a} + {b}"), a + b)
        }
        1 => {
            let (a, b) = (rng.gen_range(25..=74), rng.gen_range(1..=25));
            (format!("{a} - {b}"), a - b)
        }
        _ => {
            let (a, b) = (rng.gen_range(1..=12), rng.gen_range(1..=12));
            (format!("{a} × {b}"), a * b)
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn evaluate(question: &str) -> i64 {
        let parts: Vec<&str> = question.split(' ').collect();
        let (a, op, b) = (parts[0], parts[1], parts[2]);
        let (a, b): (i64, i64) = (a.parse().unwrap(), b.parse().unwrap());
        match op {
            "+" => a + b,
            "-" => a - b,
            "×" => a * b,
            other => panic!("unexpected operator {other}"),
        }
    }

    #[test]
    fn questions_match_their_answers() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let (question, answer) = arithmetic_challenge(&mut rng);
            assert_eq!(evaluate(&question), answer, "{question}");
            assert!(answer > 0);
        }
    }

    #[tokio::test]
    async fn challenges_are_single_use() {
        let issuer = ChallengeIssuer::new(&CaptchaConfig::default());
        let challenge = issuer.issue().await;
        assert_eq!(challenge.id.len(), 32);
        assert_eq!(challenge.expires_in_seconds, 300);
        let proof = VerificationProof {
            challenge_id: challenge.id.clone(),
            answer: evaluate(&challenge.question),
        };
        assert!(issuer.verify(&proof).await);
        assert!(!issuer.verify(&proof).await);
    }

    #[tokio::test]
    async fn wrong_answers_burn_the_challenge() {
        let issuer = ChallengeIssuer::new(&CaptchaConfig::default());
        let challenge = issuer.issue().await;
        let answer = evaluate(&challenge.question);
        let wrong = VerificationProof {
            challenge_id: challenge.id.clone(),
            answer: answer + 1,
        };
        assert!(!issuer.verify(&wrong).await);
        let right = VerificationProof {
            challenge_id: challenge.id,
            answer,
        };
        assert!(!issuer.verify(&right).await);
    }

    #[tokio::test]
    async fn client_supplied_ids_are_rejected() {
        let issuer = ChallengeIssuer::new(&CaptchaConfig::default());
        let forged = VerificationProof {
            challenge_id: "abc123".to_string(),
            answer: 8,
        };
        assert!(!issuer.verify(&forged).await);
    }
}
