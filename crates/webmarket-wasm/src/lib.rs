//! Browser WASM bindings for the webmarket record store
//!
//! Exposes a `Webmarket` class to JavaScript. Every asynchronous method returns a
//! `Promise`; failures reject with a JS `Error` carrying the engine's message.
//!
//! ```js
//! const store = await Webmarket.open("shop");
//! const id = await store.insertOne({ sku: "A-1", qty: 3 });
//! const record = await store.selectById(id); // { id: 1, data: { sku: "A-1", qty: 3 } }
//! await store.close();
//! await Webmarket.deleteDatabase("shop");
//! ```

mod browser;

pub use browser::Webmarket;
