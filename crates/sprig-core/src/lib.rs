pub mod error;
pub mod heap;
pub mod table;
pub mod value;

pub use error::SprigError;
pub use heap::{ExtData, Heap, MapData, SeqData, META_LINE, META_NAME, META_REGISTERS};
pub use table::ValueMap;
pub use value::{
    compare_spurs, fmt_float, hash_value, intern, resolve, with_resolved, ExtRef, MapRef, SeqRef,
    Value,
};
