//! Integration tests for the condition template library

use rule_center::{
    ConditionNode, LogicType, NewTemplate, Result, RuleCenterError, RuleStore, TemplateFilter,
    TemplateLibrary, TemplateUpdate, ValueType,
};
use serde_json::json;

const ACTOR: &str = "tester";

async fn setup() -> TemplateLibrary {
    let store = RuleStore::connect_in_memory()
        .await
        .expect("Failed to create in-memory store");
    TemplateLibrary::new(store.pool().clone())
}

fn snippet() -> Vec<ConditionNode> {
    vec![ConditionNode {
        condition_type: Some("group".to_string()),
        logic_type: Some(LogicType::And),
        children: vec![ConditionNode {
            condition_type: Some("expression".to_string()),
            field: Some("user.age".to_string()),
            operator: Some("gte".to_string()),
            value: Some(json!(18)),
            value_type: Some(ValueType::Number),
            ..Default::default()
        }],
        ..Default::default()
    }]
}

fn new_template(name: &str, category: Option<&str>) -> NewTemplate {
    NewTemplate {
        name: name.to_string(),
        description: Some("age gate snippet".to_string()),
        category: category.map(str::to_string),
        conditions: snippet(),
    }
}

#[tokio::test]
async fn test_template_create_and_get() -> Result<()> {
    let library = setup().await;

    let template = library.create(&new_template("Adult check", None), ACTOR).await?;
    assert_eq!(template.name, "Adult check");
    assert_eq!(template.category, "custom", "category defaults to custom");
    assert_eq!(template.conditions, snippet());
    assert_eq!(template.created_by.as_deref(), Some(ACTOR));

    let fetched = library.get(&template.id).await?;
    assert_eq!(fetched.name, template.name);
    assert_eq!(fetched.conditions, template.conditions);

    Ok(())
}

#[tokio::test]
async fn test_template_name_must_be_unique() -> Result<()> {
    let library = setup().await;

    library.create(&new_template("Adult check", None), ACTOR).await?;
    let result = library.create(&new_template("Adult check", None), ACTOR).await;
    assert!(matches!(result, Err(RuleCenterError::Conflict(_))));

    // Exact match only: different case is a different name
    library.create(&new_template("adult check", None), ACTOR).await?;

    Ok(())
}

#[tokio::test]
async fn test_template_update_rechecks_uniqueness() -> Result<()> {
    let library = setup().await;

    let first = library.create(&new_template("First", None), ACTOR).await?;
    library.create(&new_template("Second", None), ACTOR).await?;

    // Renaming onto another template's name is a conflict
    let result = library
        .update(
            &first.id,
            &TemplateUpdate {
                name: Some("Second".to_string()),
                ..Default::default()
            },
            ACTOR,
        )
        .await;
    assert!(matches!(result, Err(RuleCenterError::Conflict(_))));

    // Re-submitting the current name is not
    let updated = library
        .update(
            &first.id,
            &TemplateUpdate {
                name: Some("First".to_string()),
                description: Some("edited".to_string()),
                ..Default::default()
            },
            "editor",
        )
        .await?;
    assert_eq!(updated.description.as_deref(), Some("edited"));
    assert_eq!(updated.updated_by.as_deref(), Some("editor"));

    Ok(())
}

#[tokio::test]
async fn test_template_update_missing() {
    let library = setup().await;

    let result = library
        .update("no-such-template", &TemplateUpdate::default(), ACTOR)
        .await;
    assert!(matches!(result, Err(RuleCenterError::NotFound(_))));
}

#[tokio::test]
async fn test_template_rejects_malformed_snippet() -> Result<()> {
    let library = setup().await;

    let mut bad = new_template("Bad", None);
    bad.conditions[0].children[0].value = Some(json!("not a number"));

    let err = library.create(&bad, ACTOR).await.unwrap_err();
    assert!(err.is_validation(), "unexpected error: {err}");

    // Same boundary check on update
    let template = library.create(&new_template("Good", None), ACTOR).await?;
    let result = library
        .update(
            &template.id,
            &TemplateUpdate {
                conditions: Some(bad.conditions),
                ..Default::default()
            },
            ACTOR,
        )
        .await;
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn test_template_delete() -> Result<()> {
    let library = setup().await;

    let template = library.create(&new_template("Doomed", None), ACTOR).await?;
    library.delete(&template.id).await?;

    assert!(matches!(
        library.get(&template.id).await,
        Err(RuleCenterError::NotFound(_))
    ));
    assert!(matches!(
        library.delete(&template.id).await,
        Err(RuleCenterError::NotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_template_list_filters() -> Result<()> {
    let library = setup().await;

    library
        .create(&new_template("Distance gate", Some("logistics")), ACTOR)
        .await?;
    library
        .create(&new_template("Age gate", Some("identity")), ACTOR)
        .await?;
    library.create(&new_template("Misc", None), ACTOR).await?;

    let all = library.list(&TemplateFilter::default()).await?;
    assert_eq!(all.len(), 3);

    let logistics = library
        .list(&TemplateFilter {
            category: Some("logistics".to_string()),
            ..Default::default()
        })
        .await?;
    assert_eq!(logistics.len(), 1);
    assert_eq!(logistics[0].name, "Distance gate");

    // Keyword matches name or description substrings
    let gates = library
        .list(&TemplateFilter {
            keyword: Some("gate".to_string()),
            ..Default::default()
        })
        .await?;
    assert_eq!(gates.len(), 3, "description \"age gate snippet\" matches too");

    let by_description = library
        .list(&TemplateFilter {
            keyword: Some("snippet".to_string()),
            ..Default::default()
        })
        .await?;
    assert_eq!(by_description.len(), 3);

    let none = library
        .list(&TemplateFilter {
            category: Some("identity".to_string()),
            keyword: Some("Distance".to_string()),
        })
        .await?;
    assert!(none.is_empty());

    Ok(())
}
