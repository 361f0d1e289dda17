//! FAQ search tool for the customer-service agent

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{Tool, ToolOutcome};

/// One FAQ entry
struct FaqEntry {
    question: &'static str,
    answer: &'static str,
    category: &'static str,
    tags: &'static [&'static str],
}

/// Static FAQ corpus; production would back this with a knowledge base
const FAQ_ENTRIES: &[FaqEntry] = &[
    FaqEntry {
        question: "How do I update my payment method?",
        answer: "You can update your payment method under Account Settings > Billing > Payment Methods. Click 'Add New Payment Method' and follow the prompts.",
        category: "billing",
        tags: &["payment", "billing", "account"],
    },
    FaqEntry {
        question: "Why was I charged twice?",
        answer: "A duplicate charge is usually a pending authorization that drops off within 3-5 business days. If it remains after 5 days, contact billing support with your order number.",
        category: "billing",
        tags: &["charge", "duplicate", "billing"],
    },
    FaqEntry {
        question: "How do I get a refund?",
        answer: "Contact support with your order number and the reason for the refund. Refunds are processed within 5-10 business days to your original payment method.",
        category: "billing",
        tags: &["refund", "billing", "money"],
    },
    FaqEntry {
        question: "How do I reset my password?",
        answer: "Go to the login page and click 'Forgot Password'. Enter your email address and follow the link sent to your email to create a new password.",
        category: "technical",
        tags: &["password", "login", "account"],
    },
    FaqEntry {
        question: "How do I enable two-factor authentication?",
        answer: "Go to Account Settings > Security > Two-Factor Authentication. Choose SMS or an authenticator app and follow the setup instructions.",
        category: "technical",
        tags: &["security", "2fa", "authentication"],
    },
    FaqEntry {
        question: "What's your return policy?",
        answer: "We offer a 30-day return policy for most items. Items must be unused and in original packaging; some items have different policies listed on the product page.",
        category: "product",
        tags: &["return", "policy", "refund"],
    },
    FaqEntry {
        question: "Do you ship internationally?",
        answer: "Yes, we ship to most countries. International shipping typically takes 7-14 business days; exact costs show at checkout.",
        category: "product",
        tags: &["shipping", "international", "delivery"],
    },
    FaqEntry {
        question: "How do I change my email address?",
        answer: "Go to Account Settings > Profile > Email Address. Enter your new email and verify it through the confirmation link.",
        category: "account",
        tags: &["email", "profile", "account"],
    },
    FaqEntry {
        question: "How long does shipping take?",
        answer: "Standard shipping takes 3-5 business days. Express shipping (1-2 business days) is available for an additional fee.",
        category: "order",
        tags: &["shipping", "delivery", "timeline"],
    },
    FaqEntry {
        question: "Can I cancel my order?",
        answer: "Orders can be cancelled within 1 hour of placement if they haven't been processed. Go to Order History and click 'Cancel Order' if available.",
        category: "order",
        tags: &["cancel", "order", "timeline"],
    },
];

/// Score an FAQ entry against the query; higher is more relevant
fn relevance(query: &str, entry: &FaqEntry) -> f64 {
    let question = entry.question.to_lowercase();
    let answer = entry.answer.to_lowercase();
    let mut score = 0.0;

    if question.contains(query) {
        score += 10.0;
    }
    if answer.contains(query) {
        score += 5.0;
    }

    let question_words: Vec<&str> = question.split_whitespace().collect();
    for word in query.split_whitespace() {
        if question_words.contains(&word) {
            score += 2.0;
        }
        if entry.tags.iter().any(|tag| tag.eq_ignore_ascii_case(word)) {
            score += 1.0;
        }
    }

    score
}

/// Keyword search over the FAQ corpus
pub struct SearchFaqTool;

#[async_trait]
impl Tool for SearchFaqTool {
    fn name(&self) -> &str {
        "search_faq"
    }

    fn description(&self) -> &str {
        "Search the FAQ database for answers to common customer questions. Use this to provide quick, accurate information before creating a ticket."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The customer's question or search terms"
                },
                "category": {
                    "type": "string",
                    "enum": ["billing", "technical", "product", "account", "order", "all"],
                    "description": "FAQ category to search in (use 'all' for general search)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of FAQ results to return (default: 3)",
                    "default": 3
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> ToolOutcome {
        let Some(query) = arguments.get("query").and_then(|v| v.as_str()) else {
            return ToolOutcome::tool_error("Missing required field: query");
        };
        let query = query.to_lowercase();
        let category = arguments
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("all");
        let max_results = arguments
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(3) as usize;

        let mut results: Vec<(f64, &FaqEntry)> = FAQ_ENTRIES
            .iter()
            .filter(|entry| category == "all" || entry.category == category)
            .map(|entry| (relevance(&query, entry), entry))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        results.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(max_results);

        let entries: Vec<Value> = results
            .iter()
            .map(|(score, entry)| {
                json!({
                    "question": entry.question,
                    "answer": entry.answer,
                    "category": entry.category,
                    "tags": entry.tags,
                    "relevance_score": score
                })
            })
            .collect();

        let message = if entries.is_empty() {
            "I couldn't find a specific FAQ answer for your question. Would you like me to create a support ticket to get you personalized help?".to_string()
        } else {
            format!("Found {} relevant FAQ entries for your question.", entries.len())
        };

        ToolOutcome::success(json!({
            "success": true,
            "query": query,
            "results_count": entries.len(),
            "results": entries,
            "message": message
        }))
    }
}
