use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::logger::LoggerMiddleware;
use crate::routes::{health_check, login, refresh, register, revoke, validate};

pub fn run(listener: TcpListener, service: Arc<TokenService>) -> Result<Server, std::io::Error> {
    let service = web::Data::from(service);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            .app_data(service.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/revoke", web::post().to(revoke))
                    .route("/validate", web::post().to(validate)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
