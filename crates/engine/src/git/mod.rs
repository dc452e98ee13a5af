// Git access: every repository operation shells out to the `git` binary.

pub mod worker;
