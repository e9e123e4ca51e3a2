use openldap_interop::{directory::users_search, fixture::LdapContainerRequest};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    let _ = pretty_env_logger::try_init();

    // startup the directory, seeded with testdata/test.ldif
    let ctx = LdapContainerRequest::new(
        concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/test.ldif"),
        "dc=test,dc=com",
        "Test",
        "test.com",
    )
    .start()
    .await?;

    // default admin credentials of the image
    let mut conn = ctx.connect_as_admin().await?;
    let users = conn.search(&users_search(ctx.base_dn())).await?;
    for user in &users {
        println!("{}", user.dn);
    }
    assert_eq!(users[0].dn, "uid=user1,ou=users,dc=test,dc=com");

    conn.close().await?;
    ctx.terminate().await?;
    Ok(())
}
