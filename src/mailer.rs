// src/mailer.rs - SMTP notifications
//
// Every send is caught and surfaced as a structured outcome; a mail
// failure never takes a request down with it.

use anyhow::{Context, Result};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Serialize;

use crate::config::SmtpConfig;
use crate::models::{SupplierEvaluation, BUYER_CRITERIA, VENDOR_CRITERIA};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMailKind {
    /// The supplier is asked to score the buying organization
    Buyer,
    /// The internal requester receives the latest vendor evaluation results
    Requester,
}

impl EvaluationMailKind {
    pub fn from_param(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(EvaluationMailKind::Buyer),
            "requester" => Some(EvaluationMailKind::Requester),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendOutcome {
    pub recipient: String,
    pub success: bool,
    pub error: Option<String>,
}

pub struct Mailer {
    transport: Option<SmtpTransport>,
    from: Mailbox,
    activation_base_url: String,
}

impl Mailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .with_context(|| format!("Invalid SMTP from address: {}", config.from_address))?;

        let transport = if config.dry_run {
            None
        } else {
            let mut builder =
                SmtpTransport::builder_dangerous(config.host.as_str()).port(config.port);
            if let (Some(username), Some(password)) = (&config.username, &config.password) {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            Some(builder.build())
        };

        Ok(Self {
            transport,
            from,
            activation_base_url: config.activation_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let recipient: Mailbox = to
            .parse()
            .with_context(|| format!("Invalid recipient address: {}", to))?;

        match &self.transport {
            None => {
                log::info!("Mail dry run: to={} subject={}", to, subject);
                Ok(())
            }
            Some(transport) => {
                let message = Message::builder()
                    .from(self.from.clone())
                    .to(recipient)
                    .subject(subject)
                    .body(body.to_string())
                    .context("Failed to build message")?;
                transport
                    .send(&message)
                    .with_context(|| format!("SMTP send to {} failed", to))?;
                Ok(())
            }
        }
    }

    /// Send to a list of recipients, one outcome per address.
    pub fn send_each(&self, recipients: &[String], subject: &str, body: &str) -> Vec<SendOutcome> {
        recipients
            .iter()
            .map(|to| match self.send(to, subject, body) {
                Ok(()) => SendOutcome {
                    recipient: to.clone(),
                    success: true,
                    error: None,
                },
                Err(e) => {
                    log::error!("Failed to send mail to {}: {:#}", to, e);
                    SendOutcome {
                        recipient: to.clone(),
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect()
    }

    pub fn activation_url(&self, token: &str) -> String {
        format!("{}/auth/activate/{}", self.activation_base_url, token)
    }
}

// ==================== MESSAGE BODIES ====================

pub fn activation_email(
    first_name: &str,
    activation_url: &str,
    temporary_password: &str,
) -> (String, String) {
    let subject = "Activation de votre compte / Account activation".to_string();
    let body = format!(
        "Bonjour {first_name},\n\n\
         Un compte a été créé pour vous sur la plateforme de gestion des fournisseurs.\n\
         Pour l'activer, rendez-vous sur le lien ci-dessous avec le mot de passe temporaire.\n\n\
         Hello {first_name},\n\n\
         An account has been created for you on the supplier management platform.\n\
         Use the link below together with the temporary password to activate it.\n\n\
         Lien / Link: {activation_url}\n\
         Mot de passe temporaire / Temporary password: {temporary_password}\n\n\
         Ce lien expire dans 48 heures. / This link expires in 48 hours.\n"
    );
    (subject, body)
}

/// Bilingual prompt asking the supplier to score the buying organization.
pub fn buyer_evaluation_email(supplier_name: &str) -> (String, String) {
    let subject = format!("Évaluation de la relation d'achat - {}", supplier_name);
    let mut body = format!(
        "Bonjour,\n\n\
         Dans le cadre de notre démarche d'amélioration continue, nous vous invitons\n\
         à évaluer notre organisation d'achat sur les critères suivants (0 à 10) :\n\n\
         Hello,\n\n\
         As part of our continuous improvement process, we invite you to rate our\n\
         buying organization on the following criteria (0 to 10):\n\n"
    );
    for (i, (_, fr, en)) in BUYER_CRITERIA.iter().enumerate() {
        body.push_str(&format!("  {}. {} / {}\n", i + 1, fr, en));
    }
    body.push_str("\nMerci de votre collaboration. / Thank you for your cooperation.\n");
    (subject, body)
}

/// Results of the latest vendor evaluation, sent back to the requester.
pub fn requester_evaluation_email(
    supplier_name: &str,
    evaluation: &SupplierEvaluation,
    weighted: f64,
) -> (String, String) {
    let subject = format!("Résultats d'évaluation fournisseur - {}", supplier_name);
    let mut body = format!(
        "Bonjour,\n\n\
         Voici les résultats de la dernière évaluation du fournisseur {} :\n\n",
        supplier_name
    );
    let scores = evaluation.scores();
    for ((_, fr, en), score) in VENDOR_CRITERIA.iter().zip(scores.iter()) {
        body.push_str(&format!("  {} / {} : {}/10\n", fr, en, score));
    }
    body.push_str(&format!(
        "\nTotal : {}/50\n\
         Note finale / Final rating : {:.2}/10\n\
         Note pondérée globale / Overall weighted rating : {:.2}/10\n",
        evaluation.total_score(),
        evaluation.final_rating,
        weighted
    ));
    (subject, body)
}

/// Preview payload served by the evaluation-summary endpoint; the same
/// builders feed the actual emails.
pub fn buyer_evaluation_preview(supplier_name: &str) -> serde_json::Value {
    let (subject, body) = buyer_evaluation_email(supplier_name);
    serde_json::json!({ "kind": "buyer", "subject": subject, "body": body })
}

pub fn requester_evaluation_preview(
    supplier_name: &str,
    evaluation: &SupplierEvaluation,
    weighted: f64,
) -> serde_json::Value {
    let (subject, body) = requester_evaluation_email(supplier_name, evaluation, weighted);
    serde_json::json!({ "kind": "requester", "subject": subject, "body": body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpConfig;
    use chrono::Utc;

    fn dry_mailer() -> Mailer {
        Mailer::from_config(&SmtpConfig::default()).unwrap()
    }

    #[test]
    fn test_dry_run_send_succeeds() {
        let mailer = dry_mailer();
        assert!(mailer.send("someone@example.com", "Subject", "Body").is_ok());
    }

    #[test]
    fn test_invalid_recipient_is_caught() {
        let mailer = dry_mailer();
        let outcomes = mailer.send_each(
            &["good@example.com".to_string(), "not-an-address".to_string()],
            "Subject",
            "Body",
        );
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert!(outcomes[1].error.is_some());
    }

    #[test]
    fn test_activation_url() {
        let mut config = SmtpConfig::default();
        config.activation_base_url = "https://srm.example.com/".to_string();
        let mailer = Mailer::from_config(&config).unwrap();
        assert_eq!(
            mailer.activation_url("tok123"),
            "https://srm.example.com/auth/activate/tok123"
        );
    }

    #[test]
    fn test_buyer_email_lists_all_criteria() {
        let (subject, body) = buyer_evaluation_email("ACME SARL");
        assert!(subject.contains("ACME SARL"));
        for (_, fr, en) in BUYER_CRITERIA.iter() {
            assert!(body.contains(fr), "missing French label: {}", fr);
            assert!(body.contains(en), "missing English label: {}", en);
        }
    }

    #[test]
    fn test_requester_email_contains_scores() {
        let eval = SupplierEvaluation {
            id: "e1".to_string(),
            supplier_id: "s1".to_string(),
            delivery_compliance: 8,
            delivery_timeline: 7,
            advising_capability: 9,
            after_sales_qos: 8,
            vendor_relationship: 7,
            final_rating: 7.8,
            comments: None,
            evaluator_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let (_, body) = requester_evaluation_email("ACME SARL", &eval, 7.8);
        assert!(body.contains("ACME SARL"));
        assert!(body.contains("7.80/10"));
        assert!(body.contains("8/10"));
        assert!(body.contains("Total : 39/50"));
    }
}
