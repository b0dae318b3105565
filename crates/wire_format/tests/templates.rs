//! Whole-template parsing against a real precompiled template.

use anyhow::{Result, anyhow};
use trellis_wire_format::{
    Expression, ExpressionContext, SerializedTemplate, SerializedTemplateBlock, Statement,
    TemplateBlock,
};

const TODO_LIST: &str = include_str!("fixtures/todo_list.json");

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn parses_string_block() -> Result<()> {
    init();
    let template = SerializedTemplate::from_json_str(TODO_LIST)?;
    assert_eq!(template.id.as_deref(), Some("zFkD7tc2"));
    assert!(matches!(template.block, TemplateBlock::Json(_)));

    let block = template.parse_block()?;
    assert_eq!(block.symbols, ["item"]);
    assert_eq!(block.upvars, ["each", "on"]);
    assert!(!block.has_eval);
    assert_eq!(block.statements.first(), Some(&Statement::text("\n   ")));

    let each = block
        .statements
        .iter()
        .find_map(|statement| match statement {
            Statement::Block { head, .. } => Some(head),
            _ => None,
        })
        .ok_or_else(|| anyhow!("template has no block statement"))?;
    assert_eq!(
        *each,
        Expression::GetPath(
            Box::new(Expression::GetContextualFree(0, ExpressionContext::BlockHead)),
            Vec::new()
        )
    );
    log::debug!("parsed {} statements", block.statements.len());
    Ok(())
}

#[test]
fn block_round_trips_through_serde() -> Result<()> {
    init();
    let template = SerializedTemplate::from_json_str(TODO_LIST)?;
    let TemplateBlock::Json(text) = &template.block else {
        return Err(anyhow!("fixture block should be a JSON string"));
    };
    let original: serde_json::Value = serde_json::from_str(text)?;

    let block = template.parse_block()?;
    let written = serde_json::to_value(&block)?;
    assert_eq!(written, original);

    let reparsed: SerializedTemplateBlock = serde_json::from_value(written)?;
    assert_eq!(reparsed, block);
    Ok(())
}

#[test]
fn parsed_block_serializes_as_object() -> Result<()> {
    init();
    let block = SerializedTemplateBlock {
        symbols: Vec::new(),
        statements: vec![
            Statement::OpenElement {
                tag: "p".to_owned(),
                simple: true,
            },
            Statement::FlushElement,
            Statement::text("hi"),
            Statement::CloseElement,
        ],
        has_eval: false,
        upvars: Vec::new(),
    };
    let template = SerializedTemplate::new("inline", block.clone());
    let json = serde_json::to_string(&template)?;
    assert!(json.contains(r#""statements":[[9,"p",true],[10],[1,1,0,0,"hi"],[11]]"#));

    let decoded = SerializedTemplate::from_json_str(&json)?;
    assert_eq!(decoded.parse_block()?, block);
    Ok(())
}
