use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pricewatch_core::UserId;
use pricewatch_events::{NotificationChannel, PriceChangeEvent};

pub const WELCOME_SUBJECT: &str = "Bem-vindo ao Price Watcher!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    PriceChange,
    Welcome,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Email template a notification is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Template {
    PriceTargetAchieved,
    PriceDecrease,
    PriceIncrease,
    Welcome,
    SystemNotification,
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Template::PriceTargetAchieved => "price-target-achieved",
            Template::PriceDecrease => "price-decrease",
            Template::PriceIncrease => "price-increase",
            Template::Welcome => "welcome",
            Template::SystemNotification => "system-notification",
        }
    }
}

/// Inputs a template is rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateData {
    PriceChange(PriceChangeEvent),
    Welcome { username: String },
    System { message: String },
}

/// A notification ready to hand to a channel sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub category: Category,
    pub priority: Priority,
    pub subject: String,
    pub template: Template,
    pub data: TemplateData,
    /// Rate limiting only applies when set.
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl NotificationRequest {
    /// Target reached wins over direction; a decrease is `NORMAL`, anything
    /// else `LOW`.
    pub fn price_change(
        event: &PriceChangeEvent,
        channel: NotificationChannel,
        recipient: impl Into<String>,
    ) -> Self {
        let name = &event.product_name;
        let (priority, template, subject) = if event.is_target_reached() {
            (
                Priority::High,
                Template::PriceTargetAchieved,
                format!("🎉 Meta de preço atingida: {name}"),
            )
        } else if event.is_price_decrease() {
            (
                Priority::Normal,
                Template::PriceDecrease,
                format!("📉 Preço reduzido: {name}"),
            )
        } else {
            (
                Priority::Low,
                Template::PriceIncrease,
                format!("📈 Mudança de preço: {name}"),
            )
        };

        Self {
            channel,
            recipient: recipient.into(),
            category: Category::PriceChange,
            priority,
            subject,
            template,
            data: TemplateData::PriceChange(event.clone()),
            user_id: Some(event.user_id),
            created_at: Utc::now(),
        }
    }

    pub fn welcome(email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            channel: NotificationChannel::Email,
            recipient: email.into(),
            category: Category::Welcome,
            priority: Priority::Normal,
            subject: WELCOME_SUBJECT.to_string(),
            template: Template::Welcome,
            data: TemplateData::Welcome {
                username: username.into(),
            },
            user_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn system(
        email: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            channel: NotificationChannel::Email,
            recipient: email.into(),
            category: Category::System,
            priority,
            subject: subject.into(),
            template: Template::SystemNotification,
            data: TemplateData::System {
                message: message.into(),
            },
            user_id: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::ProductId;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn event(previous: Option<Decimal>, current: Decimal, target: Option<Decimal>) -> PriceChangeEvent {
        PriceChangeEvent {
            product_id: ProductId::new(1),
            product_name: "Smart TV".to_string(),
            product_url: "https://shop.test/tv".to_string(),
            previous_price: previous,
            current_price: current,
            target_price: target,
            user_id: UserId::new(3),
            notification_channel: NotificationChannel::Email,
            event_id: uuid::Uuid::now_v7(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn target_reached_and_decrease_resolves_to_high() {
        let req = NotificationRequest::price_change(
            &event(Some(dec!(120)), dec!(95), Some(dec!(100))),
            NotificationChannel::Email,
            "a@b.c",
        );
        assert_eq!(req.priority, Priority::High);
        assert_eq!(req.template, Template::PriceTargetAchieved);
        assert_eq!(req.subject, "🎉 Meta de preço atingida: Smart TV");
        assert_eq!(req.category, Category::PriceChange);
        assert_eq!(req.user_id, Some(UserId::new(3)));
    }

    #[test]
    fn decrease_is_normal_and_increase_is_low() {
        let down = NotificationRequest::price_change(
            &event(Some(dec!(120)), dec!(110), Some(dec!(100))),
            NotificationChannel::Email,
            "a@b.c",
        );
        assert_eq!(down.priority, Priority::Normal);
        assert_eq!(down.template.name(), "price-decrease");
        assert_eq!(down.subject, "📉 Preço reduzido: Smart TV");

        let up = NotificationRequest::price_change(
            &event(Some(dec!(100)), dec!(110), None),
            NotificationChannel::Email,
            "a@b.c",
        );
        assert_eq!(up.priority, Priority::Low);
        assert_eq!(up.template.name(), "price-increase");
        assert_eq!(up.subject, "📈 Mudança de preço: Smart TV");
    }

    #[test]
    fn welcome_and_system_are_not_rate_limited() {
        let welcome = NotificationRequest::welcome("a@b.c", "Ana");
        assert_eq!(welcome.priority, Priority::Normal);
        assert_eq!(welcome.subject, WELCOME_SUBJECT);
        assert_eq!(welcome.user_id, None);

        let system = NotificationRequest::system("a@b.c", "Teste", "Olá", Priority::Low);
        assert_eq!(system.category, Category::System);
        assert_eq!(system.template, Template::SystemNotification);
        assert_eq!(system.user_id, None);
    }
}
