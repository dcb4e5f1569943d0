//! HTML rendering for email notifications.

use rust_decimal::{Decimal, RoundingStrategy};

use pricewatch_events::PriceChangeEvent;

use crate::request::{NotificationRequest, Template, TemplateData};
use crate::senders::SendError;

/// pt-BR currency formatting: `R$ 1.234,56`.
pub fn format_brl(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (integer, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, ch) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    format!("{sign}R$ {grouped},{fraction}")
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Render the HTML body of `request` with its template.
pub fn render(request: &NotificationRequest) -> Result<String, SendError> {
    let body = match (&request.template, &request.data) {
        (
            Template::PriceTargetAchieved | Template::PriceDecrease | Template::PriceIncrease,
            TemplateData::PriceChange(event),
        ) => price_body(request.template, event),
        (Template::Welcome, TemplateData::Welcome { username }) => format!(
            "<h1>Bem-vindo ao Price Watcher, {}!</h1>\
             <p>Cadastre os produtos que você quer acompanhar e defina um preço alvo. \
             Avisaremos assim que o preço mudar.</p>",
            escape(username)
        ),
        (Template::SystemNotification, TemplateData::System { message }) => {
            format!("<p>{}</p>", escape(message))
        }
        (template, _) => {
            return Err(SendError::Render(format!(
                "template {} does not match notification data",
                template.name()
            )));
        }
    };

    Ok(layout(&request.subject, &body, request.template))
}

fn price_body(template: Template, event: &PriceChangeEvent) -> String {
    let name = escape(&event.product_name);
    let url = escape(&event.product_url);
    let current = format_brl(event.current_price);

    let mut body = match template {
        Template::PriceTargetAchieved => format!(
            "<h1>Meta de preço atingida!</h1>\
             <p><strong>{name}</strong> está saindo por <strong>{current}</strong>.</p>"
        ),
        Template::PriceDecrease => format!(
            "<h1>Preço reduzido</h1><p><strong>{name}</strong> agora custa <strong>{current}</strong>.</p>"
        ),
        _ => format!(
            "<h1>Mudança de preço</h1><p><strong>{name}</strong> agora custa <strong>{current}</strong>.</p>"
        ),
    };

    body.push_str("<table>");
    if let Some(previous) = event.previous_price {
        body.push_str(&format!(
            "<tr><td>Preço anterior</td><td>{}</td></tr>",
            format_brl(previous)
        ));
    }
    body.push_str(&format!("<tr><td>Preço atual</td><td>{current}</td></tr>"));
    if let Some(target) = event.target_price {
        body.push_str(&format!(
            "<tr><td>Preço alvo</td><td>{}</td></tr>",
            format_brl(target)
        ));
    }
    if template == Template::PriceTargetAchieved {
        if let Some(savings) = event.savings() {
            body.push_str(&format!(
                "<tr><td>Economia</td><td>{}</td></tr>",
                format_brl(savings)
            ));
        }
    }
    body.push_str("</table>");
    body.push_str(&format!("<p><a href=\"{url}\">Ver produto</a></p>"));
    body
}

fn layout(subject: &str, body: &str, template: Template) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"pt-BR\"><head><meta charset=\"utf-8\"><title>{}</title></head>\
         <body data-template=\"{}\">{body}<hr><p><small>Price Watcher</small></p></body></html>",
        escape(subject),
        template.name()
    )
}
