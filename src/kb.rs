//! Knowledge-base seeding — offline, out of the ingestion hot path.
//!
//! Run with `--seed-kb` to upsert the canned passages into the vector
//! store namespace. The suggestion pipeline only ever reads.

use tracing::info;

use crate::error::SuggestError;
use crate::vector::{KnowledgeBaseEntry, KnowledgeSearch};

/// Canned passages the suggestion oracle grounds its replies in.
pub fn default_entries() -> Vec<KnowledgeBaseEntry> {
    let passages = [
        (
            "kb-01-scheduling",
            "Action: When a prospect asks to schedule a call or demo, share \
             availability for the next few days. Example: \"Happy to walk you \
             through it! I'm free Wednesday or Thursday between 2-6 PM — let \
             me know what suits you and I'll send an invite.\"",
        ),
        (
            "kb-02-confirm-meeting",
            "Action: After a meeting is booked, confirm politely: \"Great, \
             the invite is on its way. Looking forward to our conversation — \
             I'll tailor the walkthrough to your team's workflow.\"",
        ),
        (
            "kb-03-pricing-question",
            "Response: For pricing questions, avoid quoting numbers in email. \
             \"Pricing depends on seat count and usage — happy to put \
             together a quote on a quick call. Does this week work?\"",
        ),
        (
            "kb-04-product-summary",
            "Product summary: The platform ingests mail from every connected \
             inbox, classifies each message with an LLM, and surfaces \
             interested leads in a single searchable dashboard with \
             suggested replies.",
        ),
        (
            "kb-05-not-ready",
            "Response: If the prospect is not ready to buy: \"Completely \
             understand — timing matters. I'll check back next quarter; in \
             the meantime feel free to reach out with any questions.\"",
        ),
        (
            "kb-06-follow-up",
            "Action: Following up after no response for a week: \"Just \
             floating this back to the top of your inbox — still happy to \
             show you how the integration works whenever suits.\"",
        ),
        (
            "kb-07-technical-integration",
            "Information: Integration is API-first: IMAP for mailbox sync, a \
             REST search surface, and webhooks for lead notifications. A \
             sandbox tenant is available for evaluation.",
        ),
        (
            "kb-08-decline",
            "Response: Polite decline when nothing in the knowledge base \
             fits: \"Thanks for reaching out — this doesn't look like \
             something we can help with right now, but I appreciate you \
             thinking of us.\"",
        ),
    ];

    passages
        .into_iter()
        .map(|(id, text)| KnowledgeBaseEntry {
            id: id.to_string(),
            text: text.to_string(),
        })
        .collect()
}

/// Upsert the default passages into the vector store.
pub async fn seed(store: &dyn KnowledgeSearch) -> Result<(), SuggestError> {
    let entries = default_entries();
    store.upsert(&entries).await?;
    info!(count = entries.len(), "Knowledge base seeded");
    Ok(())
}
