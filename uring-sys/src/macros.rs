#[macro_export]
macro_rules! static_assert {
	($($cond:expr),+ $(,)?) => {
		$(
			const _: [u8; 1] = [0u8; ($cond) as usize];
		)+
	};
}
