use policy::{
    AccessConfig, Capability, GroupDecl, MemoryConnection, RoleDecl, Target, WILDCARD,
    register_schemas,
};
use session::{Error, Session};
use storage::{Document, DocumentStore, FieldKind, Query, Schema, SchemaRegistry, StoreConfig};
use tempfile::TempDir;

async fn store(dir: &TempDir) -> DocumentStore {
    let mut schemas = SchemaRegistry::new();
    register_schemas(&mut schemas);
    schemas.register(
        Schema::builder("Order")
            .id()
            .field("item", FieldKind::String)
            .build(),
    );
    let store = DocumentStore::open(
        StoreConfig::default().with_dir(dir.path()).with_cadence(0),
        schemas,
    )
    .await
    .unwrap();

    AccessConfig::default()
        .with_roles([
            RoleDecl::new("clerk", Some("shop"))
                .capability(Capability::data_read("Order"))
                .capability(Capability::controller("Orders"))
                .action("page.list"),
            RoleDecl::new("owner", Some("shop")).action(WILDCARD),
        ])
        .with_groups([GroupDecl::new("staff", Some("shop")).role("clerk").role("owner")])
        .seed(&store)
        .await
        .unwrap();

    store.new_table_with("orders", "Order");
    store.set("orders", &Document::new().with("item", "tea")).unwrap();
    store
}

fn session(store: DocumentStore) -> Session<MemoryConnection> {
    Session::new(store, MemoryConnection::new())
        .with_domain("shop")
        .guard_table("orders", "Order")
}

#[tokio::test]
async fn test_anonymous_is_denied_guarded_data() {
    let dir = TempDir::new().unwrap();
    let session = session(store(&dir).await);
    assert!(session.role().is_none());

    let err = session.read("orders", &Query::all()).unwrap_err();
    assert!(matches!(err, Error::AccessDenied { capability } if capability == "data.read.Order"));
}

#[tokio::test]
async fn test_clerk_reads_but_cannot_write() {
    let dir = TempDir::new().unwrap();
    let mut session = session(store(&dir).await);
    session.login("clerk").unwrap();

    let orders = session.read("orders", &Query::all()).unwrap();
    assert_eq!(orders.len(), 1);
    assert!(session.first("orders", &Query::all().field_eq("item", "tea")).unwrap().is_some());

    let err = session
        .insert("orders", &Document::new().with("item", "cake"))
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied { capability } if capability == "data.write.Order"));
    assert!(session.delete("orders", &Query::all()).is_err());
}

#[tokio::test]
async fn test_owner_wildcard_writes() {
    let dir = TempDir::new().unwrap();
    let mut session = session(store(&dir).await);
    session.login("owner").unwrap();

    let inserted = session
        .insert("orders", &Document::new().with("item", "cake"))
        .unwrap()
        .unwrap();
    assert_eq!(inserted.id(), Some(2));
    assert!(session
        .update("orders", &Document::new().with("item", "scone"), &Query::all().field_eq("id", 1))
        .unwrap());
    assert_eq!(session.read("orders", &Query::all().field_eq("item", "scone")).unwrap().len(), 1);
}

#[tokio::test]
async fn test_open_tables_need_no_role() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;
    store.new_table_with("notes", "Order");
    let session = session(store);
    assert!(session.insert("notes", &Document::new().with("item", "x")).unwrap().is_some());
    // unknown tables fall through to the store's defaults
    assert!(session.read("missing", &Query::all()).unwrap().is_empty());
    assert!(session.insert("missing", &Document::new()).unwrap().is_none());
}

#[tokio::test]
async fn test_controller_and_page_interception() {
    let dir = TempDir::new().unwrap();
    let mut session = session(store(&dir).await);
    let orders = Target::guarded("Orders");
    let list = Target::guarded("list");

    assert!(session.require_controller(&orders, None).is_err());
    session.login("clerk").unwrap();
    session.require_controller(&orders, None).unwrap();
    session.require_page(&list, Some(&orders), None).unwrap();

    let err = session
        .require_page(&Target::guarded("refund"), Some(&orders), None)
        .unwrap_err();
    assert!(matches!(err, Error::AccessDenied { capability } if capability == "page.refund"));

    let billing = Target::guarded("Billing");
    assert!(session.require_page(&list, Some(&billing), None).is_err());
    assert!(session.require_page(&Target::open("help"), None, None).is_ok());
}

#[tokio::test]
async fn test_login_is_domain_scoped() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir).await;
    let mut blog = Session::new(store.clone(), MemoryConnection::new()).with_domain("blog");
    assert!(matches!(blog.login("clerk"), Err(Error::UnknownRole(_))));

    let mut shop = session(store);
    shop.login("clerk").unwrap();
    assert!(shop.require(&Capability::page("list")).is_ok());
    assert!(shop.require(&Capability::page("ban")).is_err());
    let staff = shop.resolver().in_group(&shop.role().unwrap(), "staff");
    assert!(staff.is_some());

    shop.logout();
    assert!(shop.role().is_none());
    assert!(!shop.check(&Capability::page("list")));
}
