//! Exercises date-picker templates on each platform. The first answer
//! picks a test case, which is then collected as an optional parameter.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::engine::{Bot, InboundEvent, ParseFailure, ParseOutcome, ParseScope};
use crate::error::Result;
use crate::message::{Action, Column, MessageDescriptor};
use crate::messaging::{DeliveryReceipt, PlatformType};
use crate::skill::{parser_fn, reaction_fn, FinishHandler, ParameterDefinition, ReactionDirective, SkillDefinition};

pub const SKILL_ID: &str = "test-datetimepicker";

const TEST_CASES: [&str; 4] = [
    "buttons_date_only",
    "buttons_date_and_url",
    "carousel_date_only",
    "carousel_date_and_url",
];

const ASK_DATE: &str = "日にちを教えてください";
const LINK: &str = "https://www.linecorp.com";

pub fn definition() -> SkillDefinition {
    let mut def = SkillDefinition::new(SKILL_ID, Arc::new(Done)).required(
        ParameterDefinition::new(
            "test_case",
            MessageDescriptor::buttons(
                "テストケースを選択してください。",
                "テストケースを選択してください。",
                TEST_CASES.iter().map(|c| Action::reply(*c)).collect(),
            ),
        )
        .reaction(reaction_fn(|outcome, _raw, bot| {
            let picked = outcome
                .as_ref()
                .ok()
                .and_then(|v| v.as_str())
                .and_then(|typed| TEST_CASES.iter().find(|c| c.eq_ignore_ascii_case(typed.trim())));
            match picked {
                Some(case) => {
                    bot.collect(case)?;
                    Ok(ReactionDirective::Commit(json!(case)))
                }
                // Not one of ours; ask again.
                None => Ok(ReactionDirective::Hold),
            }
        })),
    );

    for case in TEST_CASES {
        def = def.optional(ParameterDefinition::new(case, picker_prompt(case)).inline(parser_fn(parse_postback)));
    }
    def
}

fn picker_prompt(case: &str) -> MessageDescriptor {
    let mut actions = Vec::with_capacity(2);
    if case.ends_with("and_url") {
        actions.push(Action::uri("詳細を見る", LINK));
    }
    actions.push(Action::date_picker("日にちを選択", "dummy"));
    if case.starts_with("carousel") {
        MessageDescriptor::carousel(
            ASK_DATE,
            vec![Column {
                text: "日にちを選択してください".to_string(),
                actions,
            }],
        )
    } else {
        MessageDescriptor::buttons(ASK_DATE, ASK_DATE, actions)
    }
}

/// Typed text is taken as-is; otherwise the postback shape depends on the
/// platform.
pub fn parse_postback(raw: &Value, scope: &ParseScope<'_>) -> ParseOutcome {
    if let Some(text) = raw.as_str() {
        return Ok(Value::String(text.to_string()));
    }
    let picked = match scope.platform {
        PlatformType::Line => raw.pointer("/params/date"),
        PlatformType::Facebook => raw.get("payload"),
        PlatformType::Generic => None,
    };
    picked
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or_else(|| ParseFailure::unrecognized(format!("no date in {} postback", scope.platform)))
}

struct Done;

#[async_trait]
impl FinishHandler for Done {
    async fn finish(&self, bot: &mut Bot<'_>, _event: &InboundEvent) -> Result<DeliveryReceipt> {
        let case = bot.confirmed("test_case").and_then(|v| v.as_str()).unwrap_or_default();
        debug!(
            platform = %bot.platform_type(),
            case,
            date = ?bot.confirmed(case),
            "date picked"
        );
        bot.reply(vec![MessageDescriptor::text("完了")]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ConversationContext, Engine};
    use crate::messaging::tests::MockGateway;
    use crate::messaging::GatewayManager;
    use crate::nlu::NluRegistry;
    use crate::skill::SkillRegistry;

    fn engine(gw: Arc<MockGateway>) -> Engine {
        let mut skills = SkillRegistry::new();
        skills.register(definition(), &NluRegistry::new()).unwrap();
        let mut gateways = GatewayManager::new();
        gateways.register(gw);
        Engine::new(skills, gateways, SKILL_ID)
    }

    #[test]
    fn postback_shapes_per_platform() {
        let ctx = ConversationContext::new();
        let scope = |platform| ParseScope {
            parameter: "buttons_date_only",
            platform,
            context: &ctx,
        };
        assert_eq!(
            parse_postback(&json!({"data": "dummy", "params": {"date": "2026-10-16"}}), &scope(PlatformType::Line)),
            Ok(json!("2026-10-16"))
        );
        assert_eq!(
            parse_postback(&json!({"payload": "2026-10-17"}), &scope(PlatformType::Facebook)),
            Ok(json!("2026-10-17"))
        );
        assert_eq!(parse_postback(&json!("tomorrow"), &scope(PlatformType::Generic)), Ok(json!("tomorrow")));
        assert!(parse_postback(&json!({"payload": "x"}), &scope(PlatformType::Generic)).is_err());
        assert!(parse_postback(&json!({"data": "dummy"}), &scope(PlatformType::Line)).is_err());
    }

    #[test]
    fn prompts_match_case_names() {
        let json = serde_json::to_value(picker_prompt("buttons_date_only")).unwrap();
        assert_eq!(json["altText"], "日にちを教えてください");
        assert_eq!(json["template"]["type"], "buttons");
        assert_eq!(json["template"]["text"], "日にちを教えてください");
        assert_eq!(
            json["template"]["actions"],
            json!([{"type": "datetimepicker", "label": "日にちを選択", "mode": "date", "data": "dummy"}])
        );

        let json = serde_json::to_value(picker_prompt("buttons_date_and_url")).unwrap();
        assert_eq!(json["template"]["actions"][0], json!({"type": "uri", "label": "詳細を見る", "uri": LINK}));
        assert_eq!(json["template"]["actions"][1]["type"], "datetimepicker");

        let json = serde_json::to_value(picker_prompt("carousel_date_only")).unwrap();
        assert_eq!(json["altText"], "日にちを教えてください");
        assert_eq!(json["template"]["type"], "carousel");
        let columns = json["template"]["columns"].as_array().unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0]["text"], "日にちを選択してください");
        assert_eq!(columns[0]["actions"].as_array().unwrap().len(), 1);

        let json = serde_json::to_value(picker_prompt("carousel_date_and_url")).unwrap();
        let actions = &json["template"]["columns"][0]["actions"];
        assert_eq!(actions[0]["type"], "uri");
        assert_eq!(actions[1]["label"], "日にちを選択");
    }

    #[tokio::test]
    async fn selected_case_is_collected_then_finishes() {
        let gw = MockGateway::new(PlatformType::Line);
        let engine = engine(gw.clone());
        let report = engine.handle(&InboundEvent::new(PlatformType::Line, "U9", json!("start"))).await.unwrap();
        assert_eq!(report.prompted.as_deref(), Some("test_case"));

        let report = engine
            .handle(&InboundEvent::new(PlatformType::Line, "U9", json!("carousel_date_only")))
            .await
            .unwrap();
        assert_eq!(report.prompted.as_deref(), Some("carousel_date_only"));
        assert_eq!(gw.messages().last(), Some(&picker_prompt("carousel_date_only")));

        let postback = json!({"data": "dummy", "params": {"date": "2026-10-16"}});
        let report = engine
            .handle(&InboundEvent::new(PlatformType::Line, "U9", postback))
            .await
            .unwrap();
        assert!(report.finished);
        assert_eq!(gw.messages().last(), Some(&MessageDescriptor::text("完了")));
    }

    #[tokio::test]
    async fn typed_case_name_is_normalised() {
        let gw = MockGateway::new(PlatformType::Generic);
        let engine = engine(gw.clone());
        let send = |value: Value| InboundEvent::new(PlatformType::Generic, "g1", value);
        engine.handle(&send(json!("start"))).await.unwrap();

        let report = engine.handle(&send(json!("  Buttons_Date_And_URL "))).await.unwrap();
        assert_eq!(report.prompted.as_deref(), Some("buttons_date_and_url"));
        let ctx = engine.sessions().snapshot("generic:g1").await.unwrap();
        assert_eq!(ctx.confirmed.get("test_case"), Some(&json!("buttons_date_and_url")));

        let report = engine.handle(&send(json!("2026-11-03"))).await.unwrap();
        assert!(report.finished);
        let ctx = engine.sessions().snapshot("generic:g1").await.unwrap();
        assert_eq!(ctx.confirmed.get("buttons_date_and_url"), Some(&json!("2026-11-03")));
    }

    #[tokio::test]
    async fn finished_run_does_not_finish_again_on_later_messages() {
        let gw = MockGateway::new(PlatformType::Line);
        let engine = engine(gw.clone());
        let send = |value: Value| InboundEvent::new(PlatformType::Line, "U7", value);
        let done = MessageDescriptor::text("完了");
        let finishes = || gw.messages().iter().filter(|m| **m == done).count();

        engine.handle(&send(json!("start"))).await.unwrap();
        engine.handle(&send(json!("buttons_date_only"))).await.unwrap();
        let report = engine
            .handle(&send(json!({"data": "dummy", "params": {"date": "2026-10-16"}})))
            .await
            .unwrap();
        assert!(report.finished);
        assert_eq!(finishes(), 1);

        let report = engine.handle(&send(json!("hello"))).await.unwrap();
        assert!(!report.finished);
        assert_eq!(report.prompted.as_deref(), Some("test_case"));

        // Not a case name: held, asked again.
        let report = engine.handle(&send(json!("start again"))).await.unwrap();
        assert_eq!(report.prompted.as_deref(), Some("test_case"));

        let report = engine.handle(&send(json!("buttons_date_only"))).await.unwrap();
        assert!(!report.finished);
        assert_eq!(report.prompted.as_deref(), Some("buttons_date_only"));
        assert_eq!(gw.messages().last(), Some(&picker_prompt("buttons_date_only")));
        assert_eq!(finishes(), 1);

        let ctx = engine.sessions().snapshot("line:U7").await.unwrap();
        assert_eq!(ctx.confirmed.get("buttons_date_only"), Some(&json!("2026-10-16")));
    }

    #[tokio::test]
    async fn unknown_case_is_asked_again() {
        let gw = MockGateway::new(PlatformType::Facebook);
        let engine = engine(gw.clone());
        engine.handle(&InboundEvent::new(PlatformType::Facebook, "P1", json!("start"))).await.unwrap();
        let report = engine
            .handle(&InboundEvent::new(PlatformType::Facebook, "P1", json!("nope")))
            .await
            .unwrap();
        assert_eq!(report.prompted.as_deref(), Some("test_case"));
        let ctx = engine.sessions().snapshot("facebook:P1").await.unwrap();
        assert!(!ctx.confirmed.contains("test_case"));
    }
}
