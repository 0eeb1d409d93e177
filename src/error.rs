use thiserror::Error;

/// Chyby TCP klienta. Chyby spojení se v běžící smyčce mění na stavové
/// události, chyby jednotlivých řádků na `Malformed` události.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("spojení odmítnuto")]
    ConnectRefused,

    #[error("vypršel časový limit připojení")]
    ConnectTimeout,

    #[error("chyba přenosu: {0}")]
    Transport(#[from] std::io::Error),

    #[error("neplatný JSON: {0}")]
    Decode(String),

    #[error("neúplná data: {0}")]
    Validation(String),

    /// Socket už byl zavřen druhou stranou; pouze se loguje.
    #[error("socket již uzavřen")]
    BenignCloseRace,

    #[error("klient již běží")]
    AlreadyRunning,

    #[error("nelze vytvořit runtime: {0}")]
    Runtime(std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("chyba čtení/zápisu konfigurace: {0}")]
    Io(#[from] std::io::Error),

    #[error("neplatný JSON v konfiguraci: {0}")]
    Json(#[from] serde_json::Error),

    #[error("neplatná konfigurace: {0}")]
    Invalid(String),
}
