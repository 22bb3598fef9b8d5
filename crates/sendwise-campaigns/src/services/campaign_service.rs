//! Campaign management and sending

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr,
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use sendwise_contacts::import::normalize_email;
use sendwise_contacts::ListService;
use sendwise_email::providers::SendEmailRequest;
use sendwise_email::{DomainService, ProviderService};
use sendwise_entities::{campaigns, domains, email_providers};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use crate::blocks::{
    move_block, parse_blocks, render_html, render_text, validate_blocks, TemplateBlock,
};
use crate::errors::CampaignError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Sent => "sent",
            CampaignStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CampaignError> {
        match value.trim().to_lowercase().as_str() {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "sent" => Ok(CampaignStatus::Sent),
            "failed" => Ok(CampaignStatus::Failed),
            other => Err(CampaignError::Validation(format!(
                "Unknown campaign status: {}",
                other
            ))),
        }
    }

    /// Drafts and scheduled campaigns can still be edited or sent
    pub fn is_editable(&self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Scheduled)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub subject: String,
    pub from_name: Option<String>,
    pub from_email: String,
    pub reply_to: Option<String>,
    pub domain_id: Option<i32>,
    pub provider_id: Option<i32>,
    pub list_id: Option<i32>,
    pub blocks: Vec<TemplateBlock>,
}

/// Omitted fields are left unchanged. An empty string clears `from_name` and `reply_to`.
#[derive(Debug, Clone, Default)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub reply_to: Option<String>,
    pub domain_id: Option<i32>,
    pub provider_id: Option<i32>,
    pub list_id: Option<i32>,
}

fn required(value: &str, field: &str) -> Result<String, CampaignError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CampaignError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn email_address(value: &str, field: &str) -> Result<String, CampaignError> {
    normalize_email(value)
        .ok_or_else(|| CampaignError::Validation(format!("Invalid {}: {}", field, value.trim())))
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct CampaignService {
    db: Arc<DatabaseConnection>,
    provider_service: Arc<ProviderService>,
    domain_service: Arc<DomainService>,
    list_service: Arc<ListService>,
}

impl CampaignService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider_service: Arc<ProviderService>,
        domain_service: Arc<DomainService>,
        list_service: Arc<ListService>,
    ) -> Self {
        Self {
            db,
            provider_service,
            domain_service,
            list_service,
        }
    }

    async fn check_references(
        &self,
        domain_id: Option<i32>,
        provider_id: Option<i32>,
        list_id: Option<i32>,
    ) -> Result<(), CampaignError> {
        if let Some(id) = domain_id {
            self.domain_service.get(id).await?;
        }
        if let Some(id) = provider_id {
            self.provider_service.get(id).await?;
        }
        if let Some(id) = list_id {
            self.list_service.get(id).await?;
        }
        Ok(())
    }

    fn editable(campaign: &campaigns::Model) -> Result<(), CampaignError> {
        if CampaignStatus::parse(&campaign.status)?.is_editable() {
            Ok(())
        } else {
            Err(CampaignError::InvalidState {
                id: campaign.id,
                status: campaign.status.clone(),
            })
        }
    }

    pub async fn create(
        &self,
        request: CreateCampaignRequest,
    ) -> Result<campaigns::Model, CampaignError> {
        let name = required(&request.name, "Campaign name")?;
        let subject = required(&request.subject, "Subject")?;
        let from_email = email_address(&request.from_email, "sender address")?;
        let reply_to = match optional(request.reply_to) {
            Some(reply_to) => Some(email_address(&reply_to, "reply-to address")?),
            None => None,
        };
        validate_blocks(&request.blocks)?;
        self.check_references(request.domain_id, request.provider_id, request.list_id)
            .await?;

        let campaign = campaigns::ActiveModel {
            name: Set(name),
            subject: Set(subject),
            from_name: Set(optional(request.from_name)),
            from_email: Set(from_email),
            reply_to: Set(reply_to),
            domain_id: Set(request.domain_id),
            provider_id: Set(request.provider_id),
            list_id: Set(request.list_id),
            status: Set(CampaignStatus::Draft.to_string()),
            blocks: Set(serde_json::to_value(&request.blocks)?),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        info!("Created campaign {} ({})", campaign.name, campaign.id);
        Ok(campaign)
    }

    pub async fn get(&self, id: i32) -> Result<campaigns::Model, CampaignError> {
        campaigns::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(CampaignError::NotFound(id))
    }

    /// Newest first
    pub async fn list(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<campaigns::Model>, CampaignError> {
        let mut query = campaigns::Entity::find();
        if let Some(status) = status {
            query = query.filter(campaigns::Column::Status.eq(status.as_str()));
        }

        let campaigns = query
            .order_by_desc(campaigns::Column::CreatedAt)
            .order_by_desc(campaigns::Column::Id)
            .all(self.db.as_ref())
            .await?;

        Ok(campaigns)
    }

    pub async fn update(
        &self,
        id: i32,
        request: UpdateCampaignRequest,
    ) -> Result<campaigns::Model, CampaignError> {
        let campaign = self.get(id).await?;
        Self::editable(&campaign)?;
        self.check_references(request.domain_id, request.provider_id, request.list_id)
            .await?;

        let mut active_model: campaigns::ActiveModel = campaign.into();
        if let Some(name) = request.name {
            active_model.name = Set(required(&name, "Campaign name")?);
        }
        if let Some(subject) = request.subject {
            active_model.subject = Set(required(&subject, "Subject")?);
        }
        if let Some(from_name) = request.from_name {
            active_model.from_name = Set(optional(Some(from_name)));
        }
        if let Some(from_email) = request.from_email {
            active_model.from_email = Set(email_address(&from_email, "sender address")?);
        }
        if let Some(reply_to) = request.reply_to {
            active_model.reply_to = Set(match optional(Some(reply_to)) {
                Some(reply_to) => Some(email_address(&reply_to, "reply-to address")?),
                None => None,
            });
        }
        if let Some(domain_id) = request.domain_id {
            active_model.domain_id = Set(Some(domain_id));
        }
        if let Some(provider_id) = request.provider_id {
            active_model.provider_id = Set(Some(provider_id));
        }
        if let Some(list_id) = request.list_id {
            active_model.list_id = Set(Some(list_id));
        }

        Ok(active_model.update(self.db.as_ref()).await?)
    }

    pub async fn delete(&self, id: i32) -> Result<(), CampaignError> {
        let campaign = self.get(id).await?;
        if campaign.status == CampaignStatus::Sending.as_str() {
            return Err(CampaignError::InvalidState {
                id,
                status: campaign.status,
            });
        }

        campaigns::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        info!("Deleted campaign {}", id);
        Ok(())
    }

    pub fn blocks(campaign: &campaigns::Model) -> Result<Vec<TemplateBlock>, CampaignError> {
        Ok(parse_blocks(&campaign.blocks)?)
    }

    /// Replaces the whole block list
    pub async fn update_blocks(
        &self,
        id: i32,
        blocks: Vec<TemplateBlock>,
    ) -> Result<campaigns::Model, CampaignError> {
        let campaign = self.get(id).await?;
        Self::editable(&campaign)?;
        validate_blocks(&blocks)?;

        let mut active_model: campaigns::ActiveModel = campaign.into();
        active_model.blocks = Set(serde_json::to_value(&blocks)?);
        Ok(active_model.update(self.db.as_ref()).await?)
    }

    /// Moves one block from `from` to `to`, keeping every id
    pub async fn reorder_block(
        &self,
        id: i32,
        from: usize,
        to: usize,
    ) -> Result<campaigns::Model, CampaignError> {
        let campaign = self.get(id).await?;
        Self::editable(&campaign)?;

        let mut blocks = Self::blocks(&campaign)?;
        move_block(&mut blocks, from, to)?;
        debug!("Moved block {} to {} in campaign {}", from, to, id);

        let mut active_model: campaigns::ActiveModel = campaign.into();
        active_model.blocks = Set(serde_json::to_value(&blocks)?);
        Ok(active_model.update(self.db.as_ref()).await?)
    }

    /// Records the send time. Nothing dispatches scheduled campaigns yet.
    pub async fn schedule(
        &self,
        id: i32,
        scheduled_at: DateTime<Utc>,
    ) -> Result<campaigns::Model, CampaignError> {
        let campaign = self.get(id).await?;
        Self::editable(&campaign)?;
        if scheduled_at <= Utc::now() {
            return Err(CampaignError::Validation(
                "Scheduled time must be in the future".into(),
            ));
        }

        let mut active_model: campaigns::ActiveModel = campaign.into();
        active_model.status = Set(CampaignStatus::Scheduled.to_string());
        active_model.scheduled_at = Set(Some(scheduled_at));
        let updated = active_model.update(self.db.as_ref()).await?;

        info!("Scheduled campaign {} for {}", id, scheduled_at);
        Ok(updated)
    }

    /// The campaign's domain, or the stored domain matching the sender address
    async fn resolve_domain(
        &self,
        campaign: &campaigns::Model,
    ) -> Result<Option<domains::Model>, CampaignError> {
        if let Some(domain_id) = campaign.domain_id {
            return Ok(Some(self.domain_service.get(domain_id).await?));
        }
        match campaign.from_email.rsplit_once('@') {
            Some((_, sender_domain)) => Ok(self.domain_service.find_by_name(sender_domain).await?),
            None => Ok(None),
        }
    }

    /// The campaign's provider, else the domain's, else the newest active one
    async fn resolve_provider(
        &self,
        campaign: &campaigns::Model,
        domain: Option<&domains::Model>,
    ) -> Result<email_providers::Model, CampaignError> {
        if let Some(provider_id) = campaign.provider_id.or(domain.and_then(|d| d.provider_id)) {
            return Ok(self.provider_service.get(provider_id).await?);
        }
        self.provider_service
            .list_active()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CampaignError::Validation("No active email provider configured".into()))
    }

    /// Moves a draft or scheduled campaign to `sending` in one statement, so only
    /// one caller can start a send
    async fn claim_for_sending(&self, id: i32, recipients: usize) -> Result<(), CampaignError> {
        let claimed = campaigns::Entity::update_many()
            .col_expr(
                campaigns::Column::Status,
                Expr::value(CampaignStatus::Sending.as_str()),
            )
            .col_expr(campaigns::Column::Recipients, Expr::value(recipients as i32))
            .col_expr(campaigns::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(campaigns::Column::Id.eq(id))
            .filter(campaigns::Column::Status.is_in([
                CampaignStatus::Draft.as_str(),
                CampaignStatus::Scheduled.as_str(),
            ]))
            .exec(self.db.as_ref())
            .await?;

        if claimed.rows_affected == 0 {
            let current = self.get(id).await?;
            return Err(CampaignError::InvalidState {
                id,
                status: current.status,
            });
        }
        Ok(())
    }

    /// Marks a campaign still in `sending` as failed
    async fn release_failed(&self, id: i32) {
        let released = campaigns::Entity::update_many()
            .col_expr(
                campaigns::Column::Status,
                Expr::value(CampaignStatus::Failed.as_str()),
            )
            .filter(campaigns::Column::Id.eq(id))
            .filter(campaigns::Column::Status.eq(CampaignStatus::Sending.as_str()))
            .exec(self.db.as_ref())
            .await;
        if let Err(e) = released {
            error!("Campaign {} is stuck in sending: {}", id, e);
        }
    }

    /// Sends the campaign to every subscribed member of its list
    pub async fn send(&self, id: i32) -> Result<campaigns::Model, CampaignError> {
        let campaign = self.get(id).await?;
        Self::editable(&campaign)?;

        let list_id = campaign
            .list_id
            .ok_or_else(|| CampaignError::Validation("Campaign has no contact list".into()))?;
        let blocks = Self::blocks(&campaign)?;
        if blocks.is_empty() {
            return Err(CampaignError::Validation("Campaign has no content".into()));
        }

        let recipients = self.list_service.subscribed_members(list_id).await?;
        if recipients.is_empty() {
            return Err(CampaignError::Validation(
                "The contact list has no subscribed members".into(),
            ));
        }

        let domain = self.resolve_domain(&campaign).await?;
        let provider = self.resolve_provider(&campaign, domain.as_ref()).await?;
        let instance = self.provider_service.create_provider_instance(&provider)?;

        let html = render_html(&blocks);
        let text = render_text(&blocks);
        let emails: Vec<SendEmailRequest> = recipients
            .iter()
            .map(|contact| SendEmailRequest {
                from: campaign.from_email.clone(),
                from_name: campaign.from_name.clone(),
                to: vec![contact.email.clone()],
                cc: None,
                bcc: None,
                reply_to: campaign.reply_to.clone(),
                subject: campaign.subject.clone(),
                html: Some(html.clone()),
                text: Some(text.clone()),
                headers: None,
            })
            .collect();

        self.claim_for_sending(id, emails.len()).await?;

        info!(
            "Sending campaign {} to {} recipients via {} ({})",
            id,
            emails.len(),
            provider.name,
            instance.name()
        );

        let results = instance.send_bulk(&emails).await;
        let mut delivered: i32 = 0;
        let mut failed: i32 = 0;
        for (email, result) in emails.iter().zip(&results) {
            match result {
                Ok(_) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Campaign {} failed for {}: {}", id, email.to.join(", "), e);
                }
            }
        }

        let status = if delivered > 0 {
            CampaignStatus::Sent
        } else {
            CampaignStatus::Failed
        };
        let recorded = campaigns::Entity::update_many()
            .col_expr(campaigns::Column::Status, Expr::value(status.as_str()))
            .col_expr(campaigns::Column::Delivered, Expr::value(delivered))
            .col_expr(campaigns::Column::Failed, Expr::value(failed))
            .col_expr(campaigns::Column::SentAt, Expr::value(Utc::now()))
            .col_expr(campaigns::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(campaigns::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await;
        if let Err(e) = recorded {
            error!("Failed to record results of campaign {}: {}", id, e);
            self.release_failed(id).await;
            return Err(e.into());
        }
        let sent = self.get(id).await?;

        if let Some(domain) = domain {
            if let Err(e) = self.domain_service.mark_used(domain.id).await {
                warn!("Failed to mark domain {} as used: {}", domain.name, e);
            }
        }

        info!(
            "Campaign {} {}: {} delivered, {} failed",
            id, status, delivered, failed
        );
        Ok(sent)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blocks::BlockKind;
    use sendwise_contacts::services::{CreateContactRequest, CreateListRequest};
    use sendwise_contacts::ContactService;
    use sendwise_core::EncryptionService;
    use sendwise_database::test_utils::TestDatabase;
    use sendwise_email::dns::StaticTxtResolver;
    use sendwise_email::providers::{EmailProviderType, ProviderConfig};
    use sendwise_email::services::{CreateDomainRequest, CreateProviderRequest};
    use sendwise_email::EmailProviderFactory;
    use serde_json::json;
    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    pub(crate) struct Fixture {
        pub _db: TestDatabase,
        pub db: Arc<DatabaseConnection>,
        pub providers: Arc<ProviderService>,
        pub domains: Arc<DomainService>,
        pub lists: Arc<ListService>,
        pub contacts: ContactService,
        pub campaigns: CampaignService,
    }

    pub(crate) async fn fixture() -> Fixture {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let db = test_db.db.clone();
        let encryption = Arc::new(
            EncryptionService::new(
                "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            )
            .unwrap(),
        );
        let providers = Arc::new(ProviderService::with_factory(
            db.clone(),
            encryption,
            EmailProviderFactory::new(Arc::new(StaticTxtResolver::new())),
        ));
        let domains = Arc::new(DomainService::new(db.clone(), providers.clone()));
        let lists = Arc::new(ListService::new(db.clone()));
        let campaigns = CampaignService::new(
            db.clone(),
            providers.clone(),
            domains.clone(),
            lists.clone(),
        );

        Fixture {
            _db: test_db,
            contacts: ContactService::new(db.clone()),
            db,
            providers,
            domains,
            lists,
            campaigns,
        }
    }

    pub(crate) fn draft(list_id: Option<i32>) -> CreateCampaignRequest {
        CreateCampaignRequest {
            name: "March newsletter".to_string(),
            subject: "What's new in March".to_string(),
            from_name: Some("Sendwise".to_string()),
            from_email: "news@example.com".to_string(),
            list_id,
            blocks: vec![
                TemplateBlock::new(BlockKind::Heading, json!({"text": "Hello"})),
                TemplateBlock::new(BlockKind::Text, json!({"text": "Body"})),
                TemplateBlock::new(BlockKind::Divider, serde_json::Value::Null),
            ],
            ..Default::default()
        }
    }

    /// A list holding the given addresses, all subscribed
    pub(crate) async fn audience(fixture: &Fixture, emails: &[&str]) -> i32 {
        let list = fixture
            .lists
            .create(CreateListRequest {
                name: "Audience".to_string(),
                description: None,
            })
            .await
            .unwrap();
        let mut ids = Vec::new();
        for email in emails {
            let contact = fixture
                .contacts
                .create(CreateContactRequest {
                    email: email.to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
            ids.push(contact.id);
        }
        fixture.lists.add_contacts(list.id, &ids).await.unwrap();
        list.id
    }

    async fn sendgrid(fixture: &Fixture, server: &MockServer) -> i32 {
        fixture
            .providers
            .create(CreateProviderRequest {
                name: "SendGrid".to_string(),
                provider_type: EmailProviderType::SendGrid,
                config: ProviderConfig {
                    api_key: Some("SG.abcdefghijklmnop.abcdefghijklmnopqrstuvwxyz".to_string()),
                    base_url: Some(server.uri()),
                    ..Default::default()
                },
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_create_validates_and_starts_as_draft() {
        let f = fixture().await;

        let campaign = f.campaigns.create(draft(None)).await.unwrap();
        assert_eq!(campaign.status, "draft");
        assert_eq!(CampaignService::blocks(&campaign).unwrap().len(), 3);
        assert_eq!(campaign.recipients, 0);

        let mut bad = draft(None);
        bad.from_email = "not-an-address".to_string();
        assert!(matches!(
            f.campaigns.create(bad).await,
            Err(CampaignError::Validation(_))
        ));

        let mut bad = draft(None);
        bad.subject = "  ".to_string();
        assert!(matches!(
            f.campaigns.create(bad).await,
            Err(CampaignError::Validation(_))
        ));

        assert!(matches!(
            f.campaigns.create(draft(Some(404))).await,
            Err(CampaignError::Contact(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let f = fixture().await;
        let first = f.campaigns.create(draft(None)).await.unwrap();
        let second = f.campaigns.create(draft(None)).await.unwrap();
        f.campaigns
            .schedule(second.id, Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();

        let all = f.campaigns.list(None).await.unwrap();
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);

        let drafts = f.campaigns.list(Some(CampaignStatus::Draft)).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, first.id);
    }

    #[tokio::test]
    async fn test_reorder_and_replace_blocks() {
        let f = fixture().await;
        let campaign = f.campaigns.create(draft(None)).await.unwrap();
        let before = CampaignService::blocks(&campaign).unwrap();

        let reordered = f.campaigns.reorder_block(campaign.id, 2, 0).await.unwrap();
        let after = CampaignService::blocks(&reordered).unwrap();
        assert_eq!(after[0].id, before[2].id);
        assert_eq!(after[1].id, before[0].id);
        assert_eq!(after[2].id, before[1].id);

        assert!(matches!(
            f.campaigns.reorder_block(campaign.id, 0, 3).await,
            Err(CampaignError::Block(_))
        ));

        let replaced = f
            .campaigns
            .update_blocks(campaign.id, vec![before[1].clone()])
            .await
            .unwrap();
        assert_eq!(CampaignService::blocks(&replaced).unwrap(), vec![before[1].clone()]);
    }

    #[tokio::test]
    async fn test_schedule_requires_future_time() {
        let f = fixture().await;
        let campaign = f.campaigns.create(draft(None)).await.unwrap();

        assert!(matches!(
            f.campaigns
                .schedule(campaign.id, Utc::now() - chrono::Duration::minutes(1))
                .await,
            Err(CampaignError::Validation(_))
        ));

        let at = Utc::now() + chrono::Duration::hours(2);
        let scheduled = f.campaigns.schedule(campaign.id, at).await.unwrap();
        assert_eq!(scheduled.status, "scheduled");
        assert_eq!(
            scheduled.scheduled_at.map(|t| t.timestamp()),
            Some(at.timestamp())
        );
    }

    #[tokio::test]
    async fn test_send_records_counts_and_marks_domain_used() {
        let f = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(body_string_contains("bounce@example.org"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid recipient"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202).insert_header("x-message-id", "sg-ok"))
            .mount(&server)
            .await;

        let provider_id = sendgrid(&f, &server).await;
        let domain = f
            .domains
            .create(CreateDomainRequest {
                name: "example.com".to_string(),
                provider_id: Some(provider_id),
                ..Default::default()
            })
            .await
            .unwrap();
        let list_id = audience(
            &f,
            &["a@example.org", "b@example.org", "bounce@example.org"],
        )
        .await;

        let campaign = f.campaigns.create(draft(Some(list_id))).await.unwrap();
        let sent = f.campaigns.send(campaign.id).await.unwrap();

        assert_eq!(sent.status, "sent");
        assert_eq!(sent.recipients, 3);
        assert_eq!(sent.delivered, 2);
        assert_eq!(sent.failed, 1);
        assert!(sent.sent_at.is_some());
        assert_eq!(server.received_requests().await.unwrap().len(), 3);

        let domain = f.domains.get(domain.id).await.unwrap();
        assert!(domain.last_used_at.is_some());

        // A sent campaign cannot be sent or edited again
        assert!(matches!(
            f.campaigns.send(campaign.id).await,
            Err(CampaignError::InvalidState { .. })
        ));
        assert!(matches!(
            f.campaigns
                .update(campaign.id, UpdateCampaignRequest::default())
                .await,
            Err(CampaignError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_with_every_delivery_failing() {
        let f = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;
        sendgrid(&f, &server).await;
        let list_id = audience(&f, &["a@example.org"]).await;

        let campaign = f.campaigns.create(draft(Some(list_id))).await.unwrap();
        let sent = f.campaigns.send(campaign.id).await.unwrap();

        assert_eq!(sent.status, "failed");
        assert_eq!(sent.delivered, 0);
        assert_eq!(sent.failed, 1);
    }

    #[tokio::test]
    async fn test_concurrent_sends_deliver_once() {
        let f = fixture().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(202).insert_header("x-message-id", "sg-ok"))
            .expect(2)
            .mount(&server)
            .await;
        sendgrid(&f, &server).await;
        let list_id = audience(&f, &["a@example.org", "b@example.org"]).await;
        let campaign = f.campaigns.create(draft(Some(list_id))).await.unwrap();

        let (first, second) = tokio::join!(
            f.campaigns.send(campaign.id),
            f.campaigns.send(campaign.id)
        );

        let outcomes = [first, second];
        let sent: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].delivered, 2);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(CampaignError::InvalidState { .. }))));
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_send_refuses_campaign_already_sending() {
        let f = fixture().await;
        let server = MockServer::start().await;
        sendgrid(&f, &server).await;
        let list_id = audience(&f, &["a@example.org"]).await;
        let campaign = f.campaigns.create(draft(Some(list_id))).await.unwrap();

        campaigns::Entity::update_many()
            .col_expr(campaigns::Column::Status, Expr::value("sending"))
            .filter(campaigns::Column::Id.eq(campaign.id))
            .exec(f.db.as_ref())
            .await
            .unwrap();

        match f.campaigns.send(campaign.id).await {
            Err(CampaignError::InvalidState { status, .. }) => assert_eq!(status, "sending"),
            other => panic!("expected InvalidState, got {:?}", other.map(|c| c.status)),
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_preconditions() {
        let f = fixture().await;

        let no_list = f.campaigns.create(draft(None)).await.unwrap();
        assert!(matches!(
            f.campaigns.send(no_list.id).await,
            Err(CampaignError::Validation(_))
        ));

        let list_id = audience(&f, &["a@example.org"]).await;
        let no_provider = f.campaigns.create(draft(Some(list_id))).await.unwrap();
        let err = f.campaigns.send(no_provider.id).await.unwrap_err();
        assert!(err.to_string().contains("No active email provider"));

        let mut empty = draft(Some(list_id));
        empty.blocks.clear();
        let empty = f.campaigns.create(empty).await.unwrap();
        assert!(matches!(
            f.campaigns.send(empty.id).await,
            Err(CampaignError::Validation(_))
        ));

        // Nothing was attempted, so the campaigns are still drafts
        let reloaded = f.campaigns.get(no_provider.id).await.unwrap();
        assert_eq!(reloaded.status, "draft");
    }

    #[tokio::test]
    async fn test_delete() {
        let f = fixture().await;
        let campaign = f.campaigns.create(draft(None)).await.unwrap();
        f.campaigns.delete(campaign.id).await.unwrap();
        assert!(matches!(
            f.campaigns.get(campaign.id).await,
            Err(CampaignError::NotFound(_))
        ));
    }
}
