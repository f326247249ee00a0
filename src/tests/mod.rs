#[cfg(test)]
pub mod options_tests;



#[cfg(test)]
pub mod session_tests;
