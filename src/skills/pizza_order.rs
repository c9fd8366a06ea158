//! Pizza delivery order: menu item, size, address, name, then a review
//! step that can send the customer back to correct earlier answers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::engine::{Bot, ConversationContext, InboundEvent, ParseFailure, ParseOutcome, ParseScope};
use crate::error::Result;
use crate::message::{Action, MessageDescriptor};
use crate::messaging::DeliveryReceipt;
use crate::morph::MorphAnalyzer;
use crate::skill::{
    parser_fn, reaction_fn, FinishHandler, InlineParser, ParameterDefinition, PromptSource, ReactionDirective,
    SkillDefinition,
};

pub const SKILL_ID: &str = "pizza-order";

/// Build the skill. `nlu` names the registered classifier used for menu,
/// size and yes/no answers.
pub fn definition(nlu: &str, analyzer: Arc<dyn MorphAnalyzer>) -> SkillDefinition {
    SkillDefinition::new(SKILL_ID, Arc::new(OrderFinish))
        .required(
            ParameterDefinition::new(
                "pizza",
                MessageDescriptor::buttons(
                    "ご注文のピザはお決まりでしょうか？ マルゲリータ、マリナーラからお選びください。",
                    "ご注文のピザはお決まりでしょうか？",
                    vec![Action::reply("マルゲリータ"), Action::reply("マリナーラ")],
                ),
            )
            .service(nlu)
            .reaction(reaction_fn(|outcome, raw, bot| {
                match outcome {
                    // Nothing was said; ask the same way again.
                    Err(_) if raw.as_str() == Some("") => {}
                    Err(_) => bot.change_message_to_confirm(
                        "pizza",
                        MessageDescriptor::text(
                            "恐れ入りますが当店ではマルゲリータかマリナーラしかございません。どちらになさいますか？",
                        ),
                    )?,
                    Ok(value) => bot.queue(MessageDescriptor::text(format!(
                        "{}ですね。ありがとうございます。",
                        value.as_str().unwrap_or_default()
                    ))),
                }
                Ok(ReactionDirective::Proceed)
            })),
        )
        .required(
            ParameterDefinition::new(
                "size",
                MessageDescriptor::buttons(
                    "サイズはいかがいたしましょうか？ S、M、Lからお選びください。",
                    "サイズはいかがいたしましょうか？",
                    vec![Action::reply("S"), Action::reply("M"), Action::reply("L")],
                ),
            )
            .service(nlu),
        )
        .required(
            ParameterDefinition::new("address", MessageDescriptor::text("お届け先の住所を教えていただけますか？"))
                .inline(parser_fn(parse_address)),
        )
        .required(
            ParameterDefinition::new("name", MessageDescriptor::text("お客様のお名前を教えていただけますか？"))
                .inline(Arc::new(NameParser { analyzer })),
        )
        .required(
            ParameterDefinition::new("review", PromptSource::dynamic(review_prompt))
                .sub_parameter(nlu, "yes_no")
                .reaction(reaction_fn(|outcome, _raw, bot| {
                    match outcome {
                        Ok(answer) if answer == "いいえ" => {
                            bot.collect("size")?;
                            bot.collect("pizza")?;
                            // Review again once the corrections are in.
                            Ok(ReactionDirective::Hold)
                        }
                        _ => Ok(ReactionDirective::Proceed),
                    }
                })),
        )
        .clear_context_on_finish(true)
}

/// Accepts plain text, a LINE location message, or a Messenger attachment
/// list carrying a location.
pub fn parse_address(raw: &Value, _scope: &ParseScope<'_>) -> ParseOutcome {
    if let Some(text) = raw.as_str() {
        return Ok(json!({"address": text, "latitude": null, "longitude": null}));
    }
    let Some(obj) = raw.as_object() else {
        return Err(ParseFailure::unrecognized("address must be text or a location"));
    };

    if let Some(address) = obj.get("address").filter(|a| !a.is_null()) {
        return Ok(json!({
            "address": address,
            "latitude": obj.get("latitude").cloned().unwrap_or(Value::Null),
            "longitude": obj.get("longitude").cloned().unwrap_or(Value::Null),
        }));
    }

    let location = obj
        .get("attachments")
        .and_then(|a| a.as_array())
        .and_then(|list| list.iter().find(|a| a.get("type").and_then(|t| t.as_str()) == Some("location")));
    if let Some(location) = location {
        let coords = &location["payload"]["coordinates"];
        if let (Some(lat), Some(long)) = (coords["lat"].as_f64(), coords["long"].as_f64()) {
            return Ok(json!({"address": null, "latitude": lat, "longitude": long}));
        }
    }

    Err(ParseFailure::unrecognized("no usable location in payload"))
}

/// Extracts a person's name (family name, then given name) through
/// morphological analysis.
pub struct NameParser {
    pub analyzer: Arc<dyn MorphAnalyzer>,
}

#[async_trait]
impl InlineParser for NameParser {
    async fn parse(&self, raw: &Value, _scope: &ParseScope<'_>) -> ParseOutcome {
        let Some(text) = raw.as_str() else {
            return Err(ParseFailure::unrecognized("name must be text"));
        };
        let tokens = self
            .analyzer
            .analyze(text)
            .await
            .map_err(|e| ParseFailure::from_upstream(e, "mecab"))?;

        let mut family = None;
        let mut given = None;
        for token in &tokens {
            if !token.is(&["名詞", "固有名詞", "人名"]) {
                continue;
            }
            match token.feature(3) {
                Some("姓") => family = Some(token.surface.as_str()),
                Some("名") => given = Some(token.surface.as_str()),
                _ => {}
            }
        }

        let full = [family, given].into_iter().flatten().collect::<Vec<_>>().join(" ");
        if full.is_empty() {
            return Err(ParseFailure::unrecognized("no person name found"));
        }
        Ok(Value::String(full))
    }
}

fn review_prompt(ctx: &ConversationContext) -> MessageDescriptor {
    let text = format!(
        "最後にご注文内容の確認です。{}の{}サイズでよろしかったでしょうか？",
        ctx.confirmed.str("pizza"),
        ctx.confirmed.str("size")
    );
    MessageDescriptor::confirm(
        text.clone(),
        text,
        vec![Action::reply("はい"), Action::reply("いいえ")],
    )
}

struct OrderFinish;

#[async_trait]
impl FinishHandler for OrderFinish {
    async fn finish(&self, bot: &mut Bot<'_>, _event: &InboundEvent) -> Result<DeliveryReceipt> {
        let address = bot.confirmed("address").cloned().unwrap_or(Value::Null);
        let confirmed = &bot.context().confirmed;
        let destination = match address["address"].as_str() {
            Some(a) => a.to_string(),
            None => format!(
                "{},{}",
                address["latitude"].as_f64().unwrap_or_default(),
                address["longitude"].as_f64().unwrap_or_default()
            ),
        };
        let text = format!(
            "{} 様、ご注文ありがとうございました！{}の{}サイズを30分以内にご指定の{}までお届けに上がります。",
            confirmed.str("name"),
            confirmed.str("pizza"),
            confirmed.str("size"),
            destination
        );
        bot.reply(vec![MessageDescriptor::text(text)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, ScheduleState};
    use crate::messaging::tests::MockGateway;
    use crate::messaging::{GatewayManager, PlatformType};
    use crate::morph::tests::StaticAnalyzer;
    use crate::morph::Token;
    use crate::nlu::tests::StaticNlu;
    use crate::nlu::NluRegistry;
    use crate::skill::SkillRegistry;

    fn nlu() -> StaticNlu {
        StaticNlu::new("dialogflow")
            .answer("マルゲリータ", "order", json!({"pizza": "マルゲリータ"}))
            .answer("マリナーラ", "order", json!({"pizza": "マリナーラ"}))
            .answer("M", "size", json!({"size": "M"}))
            .answer("L", "size", json!({"size": "L"}))
            .answer("はい", "confirm", json!({"yes_no": "はい"}))
            .answer("いいえ", "confirm", json!({"yes_no": "いいえ"}))
    }

    fn analyzer() -> StaticAnalyzer {
        StaticAnalyzer::new().answer(
            "山田太郎です",
            vec![
                Token::new("山田", &["名詞", "固有名詞", "人名", "姓"]),
                Token::new("太郎", &["名詞", "固有名詞", "人名", "名"]),
                Token::new("です", &["助動詞"]),
            ],
        )
    }

    fn engine(gw: Arc<MockGateway>) -> Engine {
        let mut registry = NluRegistry::new();
        registry.register(Arc::new(nlu()));
        let mut skills = SkillRegistry::new();
        skills
            .register(definition("dialogflow", Arc::new(analyzer())), &registry)
            .unwrap();
        let mut gateways = GatewayManager::new();
        gateways.register(gw);
        Engine::new(skills, gateways, SKILL_ID)
    }

    fn ev(value: Value) -> InboundEvent {
        InboundEvent::new(PlatformType::Line, "U1", value)
    }

    fn scope(ctx: &ConversationContext) -> ParseScope<'_> {
        ParseScope {
            parameter: "address",
            platform: PlatformType::Facebook,
            context: ctx,
        }
    }

    #[test]
    fn address_from_attachment_location() {
        let ctx = ConversationContext::new();
        let raw = json!({"attachments": [{"type": "location", "payload": {"coordinates": {"lat": 35.0, "long": 139.0}}}]});
        assert_eq!(
            parse_address(&raw, &scope(&ctx)),
            Ok(json!({"address": null, "latitude": 35.0, "longitude": 139.0}))
        );
    }

    #[test]
    fn address_from_text() {
        let ctx = ConversationContext::new();
        assert_eq!(
            parse_address(&json!("Tokyo"), &scope(&ctx)),
            Ok(json!({"address": "Tokyo", "latitude": null, "longitude": null}))
        );
    }

    #[test]
    fn address_from_line_location_message() {
        let ctx = ConversationContext::new();
        let raw = json!({"address": "東京都港区", "latitude": 35.6, "longitude": 139.7});
        assert_eq!(
            parse_address(&raw, &scope(&ctx)),
            Ok(json!({"address": "東京都港区", "latitude": 35.6, "longitude": 139.7}))
        );
    }

    #[test]
    fn address_rejects_unknown_shapes() {
        let ctx = ConversationContext::new();
        for raw in [
            json!(42),
            json!({"attachments": [{"type": "image", "payload": {}}]}),
            json!({"attachments": "nope"}),
            json!({"attachments": [{"type": "location", "payload": {}}]}),
        ] {
            assert!(parse_address(&raw, &scope(&ctx)).is_err(), "{raw}");
        }
    }

    #[tokio::test]
    async fn name_parser_joins_family_and_given() {
        let parser = NameParser {
            analyzer: Arc::new(analyzer()),
        };
        let ctx = ConversationContext::new();
        assert_eq!(parser.parse(&json!("山田太郎です"), &scope(&ctx)).await, Ok(json!("山田 太郎")));
        assert!(matches!(
            parser.parse(&json!("こんにちは"), &scope(&ctx)).await,
            Err(ParseFailure::Unrecognized(_))
        ));
    }

    #[tokio::test]
    async fn name_parser_reports_upstream_failure() {
        let mut down = StaticAnalyzer::new();
        down.down = true;
        let parser = NameParser { analyzer: Arc::new(down) };
        let ctx = ConversationContext::new();
        assert!(matches!(
            parser.parse(&json!("山田"), &scope(&ctx)).await,
            Err(ParseFailure::Upstream { .. })
        ));
    }

    #[tokio::test]
    async fn empty_pizza_answer_repeats_prompt_unchanged() {
        let gw = MockGateway::new(PlatformType::Line);
        let engine = engine(gw.clone());
        engine.handle(&ev(json!("ピザを注文したい"))).await.unwrap();
        let report = engine.handle(&ev(json!(""))).await.unwrap();
        assert_eq!(report.prompted.as_deref(), Some("pizza"));

        let ctx = engine.sessions().snapshot("line:U1").await.unwrap();
        assert!(!ctx.confirmed.contains("pizza"));
        assert_eq!(ctx.head(), Some("pizza"));
        let sent = gw.messages();
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn unknown_pizza_gets_clarifying_prompt() {
        let gw = MockGateway::new(PlatformType::Line);
        let engine = engine(gw.clone());
        engine.handle(&ev(json!("注文"))).await.unwrap();
        engine.handle(&ev(json!("ペパロニ"))).await.unwrap();
        assert_eq!(
            gw.messages().last(),
            Some(&MessageDescriptor::text(
                "恐れ入りますが当店ではマルゲリータかマリナーラしかございません。どちらになさいますか？"
            ))
        );
        // The override is one-shot; a blank answer gets the declared prompt.
        engine.handle(&ev(json!(""))).await.unwrap();
        assert!(matches!(gw.messages().last(), Some(MessageDescriptor::Template { .. })));
    }

    #[tokio::test]
    async fn review_no_recollects_pizza_then_size() {
        let gw = MockGateway::new(PlatformType::Line);
        let engine = engine(gw.clone());
        for input in [json!("注文"), json!("マルゲリータ"), json!("M"), json!("Tokyo"), json!("山田太郎です")] {
            engine.handle(&ev(input)).await.unwrap();
        }
        let ctx = engine.sessions().snapshot("line:U1").await.unwrap();
        assert_eq!(ctx.head(), Some("review"));
        assert_eq!(
            gw.messages().last(),
            Some(&review_prompt(&ctx))
        );

        let report = engine.handle(&ev(json!("いいえ"))).await.unwrap();
        assert_eq!(report.prompted.as_deref(), Some("pizza"));
        let ctx = engine.sessions().snapshot("line:U1").await.unwrap();
        assert_eq!(ctx.pending, ["pizza", "size", "review"]);
        assert_eq!(ctx.confirmed.str("pizza"), "マルゲリータ");

        let report = engine.handle(&ev(json!("マリナーラ"))).await.unwrap();
        assert_eq!(report.prompted.as_deref(), Some("size"));
        let report = engine.handle(&ev(json!("L"))).await.unwrap();
        assert_eq!(report.prompted.as_deref(), Some("review"));
        let ctx = engine.sessions().snapshot("line:U1").await.unwrap();
        assert_eq!(ctx.confirmed.str("pizza"), "マリナーラ");
        assert_eq!(ctx.confirmed.str("size"), "L");

        let report = engine.handle(&ev(json!("はい"))).await.unwrap();
        assert!(report.finished);
        assert_eq!(
            gw.messages().last(),
            Some(&MessageDescriptor::text(
                "山田 太郎 様、ご注文ありがとうございました！マリナーラのLサイズを30分以内にご指定のTokyoまでお届けに上がります。"
            ))
        );
    }

    #[tokio::test]
    async fn finished_order_clears_and_restarts() {
        let gw = MockGateway::new(PlatformType::Line);
        let engine = engine(gw.clone());
        let mut last = None;
        for input in ["注文", "マルゲリータ", "M", "Tokyo", "山田太郎です", "はい"] {
            last = Some(engine.handle(&ev(json!(input))).await.unwrap());
        }
        let last = last.unwrap();
        assert!(last.finished);
        assert_eq!(last.state, ScheduleState::Idle);
        assert!(engine.sessions().snapshot("line:U1").await.is_none());

        let report = engine.handle(&ev(json!("もう一枚"))).await.unwrap();
        assert_eq!(report.prompted.as_deref(), Some("pizza"));
        let ctx = engine.sessions().snapshot("line:U1").await.unwrap();
        assert!(ctx.confirmed.is_empty());
        assert!(!ctx.cleared);
        assert_eq!(ctx.pending, ["pizza", "size", "address", "name", "review"]);
    }

    #[tokio::test]
    async fn prefilled_pizza_is_not_asked() {
        let gw = MockGateway::new(PlatformType::Line);
        let engine = engine(gw);
        let mut e = ev(json!("マルゲリータを一枚"));
        e.parameters.insert("pizza".into(), json!("マルゲリータ"));
        let report = engine.handle(&e).await.unwrap();
        assert_eq!(report.prompted.as_deref(), Some("size"));
    }
}
