pub mod exchange_rates;
pub mod finnhub;
pub mod util;

pub use exchange_rates::ExchangeRatesClient;
pub use finnhub::FinnhubClient;
