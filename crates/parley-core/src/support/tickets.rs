//! Ticket management tools for the customer-service agent

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::tools::{Tool, ToolOutcome};

/// A support ticket record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub status: String,
    pub customer_name: String,
    pub customer_email: String,
    pub issue_type: String,
    pub priority: String,
    pub subject: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub created_at: String,
    pub updates: Vec<TicketUpdate>,
}

/// One entry in a ticket's update trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub timestamp: String,
    pub message: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

/// In-memory ticket store shared by the ticket tools.
///
/// A real deployment would put this behind a ticketing system; the agent
/// only depends on the tool calling contract.
#[derive(Debug, Default, Clone)]
pub struct TicketStore {
    tickets: Arc<RwLock<HashMap<String, Ticket>>>,
}

impl TicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a ticket by id (test/debug helper)
    pub async fn get(&self, ticket_id: &str) -> Option<Ticket> {
        self.tickets.read().await.get(ticket_id).cloned()
    }

    /// Number of stored tickets
    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.read().await.is_empty()
    }

    fn new_ticket_id() -> String {
        let date = Utc::now().format("%Y%m%d");
        let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        format!("TKT-{date}-{suffix}")
    }
}

fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, String> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required field: {key}"))
}

// ============================================================================
// Tool: create_ticket
// ============================================================================

/// Creates a new support ticket in the shared store
pub struct CreateTicketTool {
    store: TicketStore,
}

impl CreateTicketTool {
    pub fn new(store: TicketStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateTicketTool {
    fn name(&self) -> &str {
        "create_ticket"
    }

    fn description(&self) -> &str {
        "Create a new support ticket for customer issues. Use this when a customer needs help that requires tracking or escalation."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "customer_name": {
                    "type": "string",
                    "description": "Full name of the customer"
                },
                "customer_email": {
                    "type": "string",
                    "description": "Email address of the customer"
                },
                "issue_type": {
                    "type": "string",
                    "enum": ["billing", "technical", "product", "account", "order", "refund", "general"],
                    "description": "Category of the issue"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "urgent"],
                    "description": "Priority level of the ticket"
                },
                "subject": {
                    "type": "string",
                    "description": "Brief subject line describing the issue"
                },
                "description": {
                    "type": "string",
                    "description": "Detailed description of the issue and what the customer needs help with"
                },
                "order_number": {
                    "type": "string",
                    "description": "Order number if the issue is related to a purchase (optional)"
                },
                "product_name": {
                    "type": "string",
                    "description": "Product name if the issue is related to a specific product (optional)"
                }
            },
            "required": ["customer_name", "customer_email", "issue_type", "priority", "subject", "description"]
        })
    }

    async fn execute(&self, arguments: Value) -> ToolOutcome {
        let fields = (|| -> Result<_, String> {
            Ok((
                required_str(&arguments, "customer_name")?.to_string(),
                required_str(&arguments, "customer_email")?.to_string(),
                required_str(&arguments, "issue_type")?.to_string(),
                required_str(&arguments, "priority")?.to_string(),
                required_str(&arguments, "subject")?.to_string(),
                required_str(&arguments, "description")?.to_string(),
            ))
        })();
        let (customer_name, customer_email, issue_type, priority, subject, description) =
            match fields {
                Ok(fields) => fields,
                Err(message) => return ToolOutcome::tool_error(message),
            };

        let ticket_id = TicketStore::new_ticket_id();
        let now = Utc::now().to_rfc3339();
        let ticket = Ticket {
            ticket_id: ticket_id.clone(),
            status: "open".to_string(),
            customer_name: customer_name.clone(),
            customer_email,
            issue_type: issue_type.clone(),
            priority: priority.clone(),
            subject: subject.clone(),
            description: description.clone(),
            order_number: arguments
                .get("order_number")
                .and_then(|v| v.as_str())
                .map(String::from),
            product_name: arguments
                .get("product_name")
                .and_then(|v| v.as_str())
                .map(String::from),
            created_at: now.clone(),
            updates: vec![TicketUpdate {
                timestamp: now,
                message: format!("Ticket created: {description}"),
                status: "open".to_string(),
                assigned_to: None,
                resolution_notes: None,
            }],
        };

        self.store
            .tickets
            .write()
            .await
            .insert(ticket_id.clone(), ticket);

        info!(ticket_id = %ticket_id, customer = %customer_name, "Created support ticket");

        let estimated_response_time = if matches!(priority.as_str(), "high" | "urgent") {
            "2-4 hours"
        } else {
            "24 hours"
        };

        ToolOutcome::success(json!({
            "success": true,
            "ticket_id": ticket_id,
            "message": format!("Support ticket {ticket_id} has been created successfully."),
            "ticket_details": {
                "id": ticket_id,
                "status": "open",
                "priority": priority,
                "issue_type": issue_type,
                "subject": subject,
                "estimated_response_time": estimated_response_time
            }
        }))
    }
}

// ============================================================================
// Tool: update_ticket
// ============================================================================

/// Updates status and trail of an existing ticket
pub struct UpdateTicketTool {
    store: TicketStore,
}

impl UpdateTicketTool {
    pub fn new(store: TicketStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateTicketTool {
    fn name(&self) -> &str {
        "update_ticket"
    }

    fn description(&self) -> &str {
        "Update an existing support ticket with new information or status changes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ticket_id": {
                    "type": "string",
                    "description": "Unique identifier of the ticket to update"
                },
                "status": {
                    "type": "string",
                    "enum": ["open", "in_progress", "waiting_for_customer", "resolved", "closed"],
                    "description": "New status for the ticket"
                },
                "update_message": {
                    "type": "string",
                    "description": "Message to add to the ticket (e.g., resolution steps, follow-up questions)"
                },
                "assigned_to": {
                    "type": "string",
                    "description": "Name of the support agent assigned to the ticket (optional)"
                },
                "resolution_notes": {
                    "type": "string",
                    "description": "Detailed notes about how the issue was resolved (optional)"
                }
            },
            "required": ["ticket_id", "status", "update_message"]
        })
    }

    async fn execute(&self, arguments: Value) -> ToolOutcome {
        let ticket_id = match required_str(&arguments, "ticket_id") {
            Ok(id) => id.to_string(),
            Err(message) => return ToolOutcome::tool_error(message),
        };
        let status = match required_str(&arguments, "status") {
            Ok(s) => s.to_string(),
            Err(message) => return ToolOutcome::tool_error(message),
        };
        let update_message = match required_str(&arguments, "update_message") {
            Ok(m) => m.to_string(),
            Err(message) => return ToolOutcome::tool_error(message),
        };

        let mut tickets = self.store.tickets.write().await;
        let Some(ticket) = tickets.get_mut(&ticket_id) else {
            return ToolOutcome::tool_error(format!(
                "Ticket {ticket_id} was not found in our system."
            ));
        };

        let now = Utc::now().to_rfc3339();
        ticket.status = status.clone();
        ticket.updates.push(TicketUpdate {
            timestamp: now.clone(),
            message: update_message.clone(),
            status: status.clone(),
            assigned_to: arguments
                .get("assigned_to")
                .and_then(|v| v.as_str())
                .map(String::from),
            resolution_notes: arguments
                .get("resolution_notes")
                .and_then(|v| v.as_str())
                .map(String::from),
        });

        info!(ticket_id = %ticket_id, status = %status, "Updated support ticket");

        ToolOutcome::success(json!({
            "success": true,
            "ticket_id": ticket_id,
            "message": format!("Ticket {ticket_id} has been updated successfully."),
            "updated_details": {
                "id": ticket_id,
                "new_status": status,
                "update_message": update_message,
                "last_updated": now
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_args() -> Value {
        json!({
            "customer_name": "Ada Lovelace",
            "customer_email": "ada@example.com",
            "issue_type": "billing",
            "priority": "high",
            "subject": "Charged twice",
            "description": "I was charged twice for order 1234",
            "order_number": "1234"
        })
    }

    #[tokio::test]
    async fn test_create_ticket_stores_record() {
        let store = TicketStore::new();
        let tool = CreateTicketTool::new(store.clone());

        let outcome = tool.execute(create_args()).await;
        let ToolOutcome::Success(value) = outcome else {
            panic!("expected success");
        };

        let ticket_id = value["ticket_id"].as_str().unwrap().to_string();
        assert!(ticket_id.starts_with("TKT-"));
        assert_eq!(value["ticket_details"]["estimated_response_time"], "2-4 hours");

        let ticket = store.get(&ticket_id).await.unwrap();
        assert_eq!(ticket.status, "open");
        assert_eq!(ticket.order_number.as_deref(), Some("1234"));
        assert_eq!(ticket.updates.len(), 1);
    }

    #[tokio::test]
    async fn test_create_ticket_missing_field() {
        let tool = CreateTicketTool::new(TicketStore::new());
        let outcome = tool.execute(json!({"customer_name": "Ada"})).await;

        let ToolOutcome::ToolError(message) = outcome else {
            panic!("expected tool error");
        };
        assert_eq!(message, "Missing required field: customer_email");
    }

    #[tokio::test]
    async fn test_update_ticket_appends_trail() {
        let store = TicketStore::new();
        let create = CreateTicketTool::new(store.clone());
        let update = UpdateTicketTool::new(store.clone());

        let ToolOutcome::Success(created) = create.execute(create_args()).await else {
            panic!("expected success");
        };
        let ticket_id = created["ticket_id"].as_str().unwrap();

        let outcome = update
            .execute(json!({
                "ticket_id": ticket_id,
                "status": "resolved",
                "update_message": "Refund issued",
                "resolution_notes": "Duplicate authorization dropped"
            }))
            .await;
        assert!(matches!(outcome, ToolOutcome::Success(_)));

        let ticket = store.get(ticket_id).await.unwrap();
        assert_eq!(ticket.status, "resolved");
        assert_eq!(ticket.updates.len(), 2);
        assert_eq!(
            ticket.updates[1].resolution_notes.as_deref(),
            Some("Duplicate authorization dropped")
        );
    }

    #[tokio::test]
    async fn test_update_unknown_ticket() {
        let tool = UpdateTicketTool::new(TicketStore::new());
        let outcome = tool
            .execute(json!({
                "ticket_id": "TKT-00000000-NOPE",
                "status": "closed",
                "update_message": "bye"
            }))
            .await;

        let ToolOutcome::ToolError(message) = outcome else {
            panic!("expected tool error");
        };
        assert!(message.contains("not found"));
    }
}
