//! Integration tests for the registry driving the relational handler.

use tabula_core::migration::{
    ColumnDef, Ident, MemorySchema, RelationalConfig, RelationalMigrationHandler,
    SchemaConnection, Statement,
};
use tabula_core::model::{
    Attributes, ClassType, ComponentId, FieldType, Kind, Nature, RankGroupKey,
};
use tabula_core::{Error, NullMigrationHandler, Registry};

type Relational = RelationalMigrationHandler<MemorySchema>;

struct TestContext {
    registry: Registry<Relational>,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(RelationalConfig::default())
    }

    fn with_config(config: RelationalConfig) -> Self {
        let handler = RelationalMigrationHandler::new(MemorySchema::new(), config).unwrap();
        let mut registry = Registry::new(handler);
        registry.handler_mut().connection_mut().clear_log();
        Self { registry }
    }

    fn schema(&self) -> &MemorySchema {
        self.registry.handler().connection()
    }

    fn schema_mut(&mut self) -> &mut MemorySchema {
        self.registry.handler_mut().connection_mut()
    }

    fn create(&mut self, attributes: Attributes) -> ComponentId {
        self.registry.create(attributes).unwrap().id()
    }

    fn statements(&self) -> Vec<String> {
        self.schema().statements().to_vec()
    }
}

/// An "article" entity class with one always-present field group.
fn article(ctx: &mut TestContext) -> (ComponentId, ComponentId) {
    let class = ctx.create(Attributes::class("article", ClassType::Entity));
    let group = ctx.create(Attributes::field_group("main", class, false));
    (class, group)
}

#[test]
fn test_article_scenario() {
    let mut ctx = TestContext::new();

    let class = ctx.create(Attributes::class("article", ClassType::Entity));
    assert_eq!(
        ctx.statements(),
        vec![
            "CREATE TABLE `article` (`id` INT UNSIGNED NOT NULL, PRIMARY KEY(`id`)) ENGINE=InnoDB CHARSET=utf8mb4".to_string(),
            "ALTER TABLE `article` ADD CONSTRAINT `fk_article_object` FOREIGN KEY (`id`) REFERENCES `object`(`id`)".to_string(),
        ]
    );
    let table = ctx.schema().table("article").unwrap();
    assert_eq!(table.columns, ["id"]);
    assert_eq!(
        table.foreign_keys.get("fk_article_object").map(String::as_str),
        Some("object")
    );

    let group = ctx.create(Attributes::field_group("main", class, false));
    ctx.schema_mut().clear_log();

    ctx.create(Attributes::field("title", group, FieldType::string(64)));
    assert_eq!(
        ctx.statements()[0],
        "ALTER TABLE `article` ADD COLUMN `title` VARCHAR(64) NOT NULL"
    );
    assert!(ctx.schema().triggers_on("article").is_empty());

    let published = ctx.create(
        Attributes::field("published_at", group, FieldType::created_at()).optional(),
    );
    let trigger = ctx.schema().trigger("article_INSERT_trig").unwrap();
    assert_eq!(trigger.columns, ["published_at"]);
    assert!(ctx.statements().iter().any(|s| s
        == "CREATE TRIGGER `article_INSERT_trig` BEFORE INSERT ON `article` FOR EACH ROW SET NEW.`published_at` = NOW()"));
    assert!(ctx.schema().trigger("article_UPDATE_trig").is_none());

    assert!(ctx.registry.delete(published).unwrap());
    assert_eq!(ctx.schema().columns("article").unwrap(), ["id", "title"]);
    assert!(ctx.schema().triggers_on("article").is_empty());
}

#[test]
fn test_triggers_follow_timestamp_columns() {
    let mut ctx = TestContext::new();
    let (_, group) = article(&mut ctx);

    let created = ctx.create(Attributes::field("created", group, FieldType::created_at()).optional());
    let updated = ctx.create(Attributes::field("updated", group, FieldType::updated_at()).optional());

    assert_eq!(
        ctx.schema().trigger("article_INSERT_trig").unwrap().columns,
        ["created", "updated"]
    );
    assert_eq!(
        ctx.schema().trigger("article_UPDATE_trig").unwrap().columns,
        ["updated"]
    );

    assert!(ctx.registry.delete(created).unwrap());
    assert_eq!(
        ctx.schema().trigger("article_INSERT_trig").unwrap().columns,
        ["updated"]
    );

    assert!(ctx.registry.delete(updated).unwrap());
    assert!(ctx.schema().triggers_on("article").is_empty());
}

#[test]
fn test_relation_attribute_table_lifecycle() {
    let mut ctx = TestContext::new();
    let (class, group) = article(&mut ctx);
    let news = ctx.create(Attributes::type_of("news", class));
    let descriptor = ctx.create(Attributes::field(
        "related_news",
        group,
        FieldType::type_relation(news),
    ));

    // The descriptor itself has no column.
    assert_eq!(ctx.schema().columns("article").unwrap(), ["id"]);
    assert!(!ctx.schema().has_table("article_to_news"));

    let attributes: Vec<ComponentId> = ["weight", "note", "since"]
        .iter()
        .zip([
            FieldType::Integer,
            FieldType::string(32),
            FieldType::created_at(),
        ])
        .map(|(name, value)| {
            ctx.create(
                Attributes::field(
                    *name,
                    group,
                    FieldType::type_relation_attribute(descriptor, value),
                )
                .optional(),
            )
        })
        .collect();

    let table = ctx.schema().table("article_to_news").unwrap();
    assert_eq!(table.columns, ["id", "weight", "note", "since"]);
    assert_eq!(
        table.foreign_keys.get("fk_article_to_news_relation").map(String::as_str),
        Some("relation")
    );
    assert_eq!(
        ctx.schema().trigger("article_to_news_INSERT_trig").unwrap().columns,
        ["since"]
    );
    // Attribute columns never land in the class table.
    assert_eq!(ctx.schema().columns("article").unwrap(), ["id"]);

    // The descriptor cannot go while attributes hang off it.
    assert!(!ctx.registry.delete(descriptor).unwrap());

    assert!(ctx.registry.delete(attributes[2]).unwrap());
    assert_eq!(
        ctx.schema().columns("article_to_news").unwrap(),
        ["id", "weight", "note"]
    );
    assert!(ctx.schema().triggers_on("article_to_news").is_empty());

    assert!(ctx.registry.delete(attributes[0]).unwrap());
    assert_eq!(
        ctx.schema().columns("article_to_news").unwrap(),
        ["id", "note"]
    );

    assert!(ctx.registry.delete(attributes[1]).unwrap());
    assert!(!ctx.schema().has_table("article_to_news"));

    assert!(ctx.registry.delete(descriptor).unwrap());
}

#[test]
fn test_class_with_field_group_cannot_be_deleted() {
    let mut ctx = TestContext::new();
    let (class, group) = article(&mut ctx);
    ctx.schema_mut().clear_log();

    assert!(!ctx.registry.delete(class).unwrap());
    assert!(ctx.statements().is_empty());
    assert!(ctx.schema().has_table("article"));

    assert!(ctx.registry.delete(group).unwrap());
    assert!(ctx.registry.delete(class).unwrap());
    assert!(!ctx.schema().has_table("article"));
    assert!(ctx.registry.find(Kind::Class, "article").is_none());
}

#[test]
fn test_type_with_subordinates_cannot_be_deleted() {
    let mut ctx = TestContext::new();
    let class = ctx.create(Attributes::class("page", ClassType::Entry));
    let section = ctx.create(Attributes::type_of("section", class));
    let story = ctx.create(Attributes::type_of("story", class));
    ctx.registry
        .add_superior(story, Nature::Parent, section)
        .unwrap();

    assert!(!ctx.registry.delete(section).unwrap());
    assert!(ctx.registry.delete(story).unwrap());
    assert!(ctx.registry.model().subordinates_of(section).is_empty());
    assert!(ctx.registry.delete(section).unwrap());
}

#[test]
fn test_hierarchy_rules() {
    let mut ctx = TestContext::new();
    let pages = ctx.create(Attributes::class("page", ClassType::Entry));
    let people = ctx.create(Attributes::class("member", ClassType::Person));
    let levels: Vec<ComponentId> = (0..6)
        .map(|i| ctx.create(Attributes::type_of(format!("level{i}"), pages)))
        .collect();
    let profile = ctx.create(Attributes::type_of("profile", people));

    // Undeclared nature.
    assert!(matches!(
        ctx.registry.add_superior(profile, Nature::Parent, profile),
        Err(Error::CheckFailed { .. })
    ));
    // Superior of another classtype.
    assert!(matches!(
        ctx.registry.add_superior(levels[0], Nature::Parent, profile),
        Err(Error::CheckFailed { .. })
    ));
    // Translations attach to the type itself only.
    assert!(ctx
        .registry
        .add_superior(levels[0], Nature::Translation, levels[1])
        .is_err());
    ctx.registry
        .add_superior(levels[0], Nature::Translation, levels[0])
        .unwrap();

    // Entry parent chains are at most four edges deep.
    for pair in levels[..5].windows(2) {
        ctx.registry
            .add_superior(pair[1], Nature::Parent, pair[0])
            .unwrap();
    }
    let before = ctx.registry.content_hash();
    assert!(matches!(
        ctx.registry.add_superior(levels[5], Nature::Parent, levels[4]),
        Err(Error::CheckFailed { .. })
    ));
    // Cycles are rejected.
    assert!(ctx
        .registry
        .add_superior(levels[0], Nature::Parent, levels[2])
        .is_err());
    assert_eq!(ctx.registry.content_hash(), before);

    // Removing a superior is idempotent.
    ctx.registry
        .remove_superior(levels[4], Nature::Parent, levels[3])
        .unwrap();
    ctx.registry
        .remove_superior(levels[4], Nature::Parent, levels[3])
        .unwrap();
}

#[test]
fn test_selecting_required_field_fails() {
    let mut ctx = TestContext::new();
    let class = ctx.create(Attributes::class("article", ClassType::Entity));
    let extra = ctx.create(Attributes::field_group("extra", class, true));
    let title = ctx.create(Attributes::field("title", extra, FieldType::string(64)));
    let summary = ctx.create(Attributes::field("summary", extra, FieldType::Text).optional());
    let news = ctx.create(Attributes::type_of("news", class));

    assert!(matches!(
        ctx.registry.select_field(news, title),
        Err(Error::CheckFailed { .. })
    ));
    let selected = |ctx: &TestContext| {
        ctx.registry
            .get(news)
            .unwrap()
            .as_type()
            .unwrap()
            .selected_fields
            .clone()
    };
    assert!(selected(&ctx).is_empty());

    ctx.registry.select_field(news, summary).unwrap();
    assert_eq!(selected(&ctx).into_iter().collect::<Vec<_>>(), vec![summary]);

    // A selected field cannot be deleted.
    assert!(!ctx.registry.delete(summary).unwrap());
    ctx.registry.unselect_field(news, summary).unwrap();
    assert!(ctx.registry.delete(summary).unwrap());
}

#[test]
fn test_refused_change_leaves_registry_and_schema_unchanged() {
    let mut ctx = TestContext::new();
    let (class, group) = article(&mut ctx);
    ctx.create(Attributes::field("title", group, FieldType::string(64)));
    let before = ctx.registry.content_hash();

    ctx.schema_mut().fail_on("CREATE TRIGGER");
    let err = ctx
        .registry
        .create(Attributes::field("stamp", group, FieldType::created_at()).first())
        .unwrap_err();

    assert!(matches!(err, Error::ChangeRefused { .. }));
    assert_eq!(ctx.registry.content_hash(), before);
    assert_eq!(ctx.schema().columns("article").unwrap(), ["id", "title"]);
    assert!(ctx.registry.find(Kind::Field, "stamp").is_none());
    assert_eq!(
        ctx.registry
            .model()
            .fields_of_class(class)
            .iter()
            .map(|f| (f.name(), f.rank()))
            .collect::<Vec<_>>(),
        vec![("title", 1)]
    );
    assert!(!ctx.schema().in_transaction());
}

#[test]
fn test_duplicate_column_without_and_with_retry() {
    for retry in [false, true] {
        let config = if retry {
            RelationalConfig::new().with_drop_and_retry()
        } else {
            RelationalConfig::new()
        };
        let mut ctx = TestContext::with_config(config);
        let (_, group) = article(&mut ctx);

        // A column left behind by an earlier, unrecorded change.
        let stale = Statement::AddColumn {
            table: Ident::new("article").unwrap(),
            column: ColumnDef::new(
                Ident::new("title").unwrap(),
                "TEXT",
                "NULL",
            ),
        };
        ctx.schema_mut().execute(&stale).unwrap();

        let result = ctx
            .registry
            .create(Attributes::field("title", group, FieldType::string(64)));
        assert_eq!(result.is_ok(), retry);
        assert_eq!(ctx.schema().columns("article").unwrap(), ["id", "title"]);
    }
}

#[test]
fn test_rank_groups_stay_contiguous() {
    let mut ctx = TestContext::new();
    let (_, group) = article(&mut ctx);
    let fields: Vec<ComponentId> = (0..5)
        .map(|i| ctx.create(Attributes::field(format!("f{i}"), group, FieldType::Integer).optional()))
        .collect();

    ctx.registry.set_rank(fields[4], 1).unwrap();
    ctx.registry.modify_rank(fields[0], 2).unwrap();
    assert!(ctx.registry.delete(fields[2]).unwrap());
    ctx.create(Attributes::field("f5", group, FieldType::Boolean).with_rank(2));
    assert_eq!(ctx.registry.check(), 0);

    let mut ranks: Vec<u32> = ctx
        .registry
        .model()
        .rank_group_members(RankGroupKey::Fields(group))
        .iter()
        .map(|c| c.rank())
        .collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_migrate_handler_preserves_hash() {
    let mut registry = Registry::new(NullMigrationHandler::new());
    let class = registry
        .create(Attributes::class("page", ClassType::Entry).with_display("en", "Page"))
        .unwrap()
        .id();
    let group = registry
        .create(Attributes::field_group("extra", class, true))
        .unwrap()
        .id();
    let section = registry
        .create(Attributes::type_of("section", class))
        .unwrap()
        .id();
    let story = registry
        .create(Attributes::type_of("story", class).first())
        .unwrap()
        .id();
    let descriptor = registry
        .create(Attributes::field("in_section", group, FieldType::type_relation(section)))
        .unwrap()
        .id();
    registry
        .create(
            Attributes::field(
                "position",
                group,
                FieldType::type_relation_attribute(descriptor, FieldType::Integer),
            )
            .optional(),
        )
        .unwrap();
    let summary = registry
        .create(Attributes::field("summary", group, FieldType::Text).optional().first())
        .unwrap()
        .id();
    registry.select_field(story, summary).unwrap();
    registry
        .add_superior(story, Nature::Parent, section)
        .unwrap();
    registry
        .add_superior(story, Nature::Translation, story)
        .unwrap();

    let handler = RelationalMigrationHandler::new(MemorySchema::new(), RelationalConfig::default())
        .unwrap();
    let migrated = registry.migrate_handler(handler).unwrap();

    assert_eq!(migrated.content_hash(), registry.content_hash());
    assert_eq!(migrated.handler().model_state(), Some(registry.content_hash()));

    let schema = migrated.handler().connection();
    assert_eq!(schema.columns("page").unwrap(), ["id", "summary"]);
    assert_eq!(schema.columns("page_to_section").unwrap(), ["id", "position"]);
}

#[test]
fn test_content_hash_tracks_attributes() {
    let mut registry = Registry::new(NullMigrationHandler::new());
    let empty = registry.content_hash();
    let class = registry
        .create(Attributes::class("a", ClassType::Entity))
        .unwrap()
        .id();
    let one = registry.content_hash();
    assert_ne!(empty, one);

    registry
        .create(Attributes::class("b", ClassType::Entity))
        .unwrap();
    let two = registry.content_hash();
    registry.set_rank(class, 2).unwrap();
    assert_ne!(registry.content_hash(), two);
    registry.set_rank(class, 1).unwrap();
    assert_eq!(registry.content_hash(), two);
}
