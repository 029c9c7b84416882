use rocket::{
    serde::json::{json, Value},
    Route,
};

pub fn routes() -> Vec<Route> {
    routes![health]
}

#[get("/health")]
fn health() -> Value {
    json!({ "status": "ok" })
}
