pub mod campaigns;
pub mod contact_list_members;
pub mod contact_lists;
pub mod contacts;
pub mod domains;
pub mod email_providers;
