// HACK: instead of `#[macro_export]` we use `pub(crate) use <macro>`
// so that we can use `macros::<macro>!` inside the crate, the binary
// reaches the same macros through the exported crate root
#![allow(unused_imports)]

// Only for literal addresses known to be valid
#[macro_export]
macro_rules! parse_address {
    ($addr:tt) => {
        $addr.parse::<alloy::primitives::Address>().unwrap()
    };
}

#[macro_export]
macro_rules! format_eth {
    ($a: ident, $k:expr, $ck: ident, $v: expr, $cv: ident) => {
        format!(
            "    {:align$}{}\n",
            format!("{}:", $k).$ck().bold(),
            format!(
                "{} gwei ({} eth)",
                alloy::primitives::utils::format_units($v, "gwei").unwrap_or_default(),
                alloy::primitives::utils::format_ether($v),
            )
            .$cv(),
            align = $a
        )
        .as_str()
    };
}

pub(crate) use format_eth;
pub(crate) use parse_address;
